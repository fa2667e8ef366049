use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &mut Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (users, conversations, messages)");
        let tx = conn.transaction()?;
        tx.execute_batch(
            "
            CREATE TABLE user_accounts (
                id              TEXT PRIMARY KEY,
                username        TEXT NOT NULL UNIQUE,
                account_type    TEXT NOT NULL CHECK (account_type IN ('admin', 'user')),
                first_login     INTEGER NOT NULL,
                last_login      INTEGER NOT NULL,
                login_count     INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE conversations (
                id                  TEXT PRIMARY KEY,
                participant_a       TEXT NOT NULL,
                participant_b       TEXT NOT NULL,
                last_message_text   TEXT NOT NULL DEFAULT '',
                last_message_time   INTEGER NOT NULL,
                is_deleted_by_a     INTEGER NOT NULL DEFAULT 0,
                is_deleted_by_b     INTEGER NOT NULL DEFAULT 0,
                created_at          INTEGER NOT NULL,
                CHECK (participant_a < participant_b),
                UNIQUE (participant_a, participant_b)
            );

            CREATE INDEX idx_conversations_a ON conversations(participant_a);
            CREATE INDEX idx_conversations_b ON conversations(participant_b);

            CREATE TABLE messages (
                seq                 INTEGER PRIMARY KEY AUTOINCREMENT,
                id                  TEXT NOT NULL UNIQUE,
                conversation_id     TEXT NOT NULL REFERENCES conversations(id),
                sender_username     TEXT NOT NULL,
                text                TEXT NOT NULL,
                created_at          INTEGER NOT NULL,
                read_by_recipient   INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_messages_conversation
                ON messages(conversation_id, created_at, seq);

            CREATE INDEX idx_messages_unread
                ON messages(conversation_id, read_by_recipient);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
        tx.commit()?;
    }

    info!("Database migrations complete");
    Ok(())
}
