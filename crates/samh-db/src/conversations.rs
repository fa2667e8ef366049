use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;
use uuid::Uuid;

use samh_types::models::{Conversation, ConversationSummary};

use crate::models::{
    CONVERSATION_COLUMNS, account_kind_column, conversation_from_row, timestamp_column,
    uuid_column,
};
use crate::{ChatError, Database, Result};

/// Which side of a conversation a user occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    A,
    B,
}

impl Side {
    fn of(conversation: &Conversation, username: &str) -> Option<Self> {
        if conversation.participant_a == username {
            Some(Self::A)
        } else if conversation.participant_b == username {
            Some(Self::B)
        } else {
            None
        }
    }

    fn deleted_column(self) -> &'static str {
        match self {
            Self::A => "is_deleted_by_a",
            Self::B => "is_deleted_by_b",
        }
    }
}

impl Database {
    /// Return the conversation for the unordered pair `{user_a, user_b}`,
    /// creating it if it does not exist yet.
    pub fn create_or_get_conversation(&self, user_a: &str, user_b: &str) -> Result<Uuid> {
        if user_a.trim().is_empty() || user_b.trim().is_empty() || user_a == user_b {
            return Err(ChatError::InvalidParticipants);
        }
        let (first, second) = if user_a < user_b {
            (user_a, user_b)
        } else {
            (user_b, user_a)
        };
        let now = Utc::now().timestamp_millis();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO conversations
                     (id, participant_a, participant_b, last_message_text, last_message_time, created_at)
                 VALUES (?1, ?2, ?3, '', ?4, ?4)",
                params![Uuid::new_v4().to_string(), first, second, now],
            )?;

            let id = tx.query_row(
                "SELECT id FROM conversations WHERE participant_a = ?1 AND participant_b = ?2",
                params![first, second],
                |row| uuid_column(row, 0),
            )?;
            tx.commit()?;

            if inserted > 0 {
                info!("New conversation {} between {} and {}", id, first, second);
            }
            Ok(id)
        })
    }

    pub fn get_conversation(&self, id: Uuid) -> Result<Conversation> {
        self.with_conn(|conn| query_conversation(conn, id))?
            .ok_or_else(|| ChatError::conversation_not_found(id))
    }

    /// Conversations visible to `for_user`, most recently active first.
    ///
    /// Unread counts are relative to `for_user`: messages from the other
    /// participant that have not been marked read.
    pub fn list_conversations(&self, for_user: &str) -> Result<Vec<ConversationSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id,
                        CASE WHEN c.participant_a = ?1 THEN c.participant_b ELSE c.participant_a END AS contact,
                        u.account_type,
                        c.last_message_text,
                        c.last_message_time,
                        (SELECT COUNT(*) FROM messages m
                          WHERE m.conversation_id = c.id
                            AND m.sender_username != ?1
                            AND m.read_by_recipient = 0) AS unread,
                        CASE WHEN c.participant_a = ?1 THEN c.is_deleted_by_a ELSE c.is_deleted_by_b END AS deleted
                 FROM conversations c
                 LEFT JOIN user_accounts u
                        ON u.username = CASE WHEN c.participant_a = ?1 THEN c.participant_b ELSE c.participant_a END
                 WHERE (c.participant_a = ?1 AND c.is_deleted_by_a = 0)
                    OR (c.participant_b = ?1 AND c.is_deleted_by_b = 0)
                 ORDER BY c.last_message_time DESC, c.created_at DESC, c.id ASC",
            )?;

            let rows = stmt
                .query_map([for_user], |row| {
                    let contact_account_type = match row.get::<_, Option<String>>(2)? {
                        Some(_) => Some(account_kind_column(row, 2)?),
                        None => None,
                    };
                    Ok(ConversationSummary {
                        id: uuid_column(row, 0)?,
                        contact_name: row.get(1)?,
                        contact_account_type,
                        last_message_text: row.get(3)?,
                        last_message_time: timestamp_column(row, 4)?,
                        unread_count: row.get(5)?,
                        is_deleted: row.get(6)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(rows)
        })
    }

    /// Hide or restore a conversation for one participant only. Idempotent.
    pub fn set_deleted(&self, id: Uuid, for_user: &str, deleted: bool) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let conversation =
                query_conversation(&tx, id)?.ok_or_else(|| ChatError::conversation_not_found(id))?;
            let side = Side::of(&conversation, for_user).ok_or_else(|| {
                ChatError::NotFound(format!("conversation {} for user {}", id, for_user))
            })?;

            tx.execute(
                &format!(
                    "UPDATE conversations SET {} = ?1 WHERE id = ?2",
                    side.deleted_column()
                ),
                params![deleted, id.to_string()],
            )?;
            tx.commit()?;

            info!(
                "Conversation {} {} for user {}",
                id,
                if deleted { "deleted" } else { "restored" },
                for_user
            );
            Ok(())
        })
    }

    /// Mark every message not sent by `for_user` as read. Returns how many
    /// messages changed state.
    pub fn mark_read(&self, id: Uuid, for_user: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let conversation =
                query_conversation(&tx, id)?.ok_or_else(|| ChatError::conversation_not_found(id))?;
            if !conversation.has_participant(for_user) {
                return Err(ChatError::NotParticipant {
                    conversation_id: id,
                    username: for_user.to_string(),
                });
            }

            let changed = tx.execute(
                "UPDATE messages SET read_by_recipient = 1
                 WHERE conversation_id = ?1 AND sender_username != ?2 AND read_by_recipient = 0",
                params![id.to_string(), for_user],
            )?;
            tx.commit()?;
            Ok(changed)
        })
    }
}

pub(crate) fn query_conversation(conn: &Connection, id: Uuid) -> Result<Option<Conversation>> {
    let conversation = conn
        .query_row(
            &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
            [id.to_string()],
            conversation_from_row,
        )
        .optional()?;
    Ok(conversation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", "bob")]
    #[case("alice", "")]
    #[case("  ", "bob")]
    #[case("alice", "alice")]
    fn rejects_invalid_participants(#[case] a: &str, #[case] b: &str) {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.create_or_get_conversation(a, b),
            Err(ChatError::InvalidParticipants)
        ));
    }

    #[test]
    fn new_conversation_starts_empty() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_or_get_conversation("bob", "alice").unwrap();
        let c = db.get_conversation(id).unwrap();
        assert_eq!(c.participant_a, "alice");
        assert_eq!(c.participant_b, "bob");
        assert_eq!(c.last_message_text, "");
        assert!(!c.is_deleted_by_a && !c.is_deleted_by_b);

        let list = db.list_conversations("alice").unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].unread_count, 0);
        assert_eq!(list[0].contact_name, "bob");
    }

    #[test]
    fn set_deleted_rejects_outsiders() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_or_get_conversation("alice", "bob").unwrap();
        assert!(matches!(
            db.set_deleted(id, "carol", true),
            Err(ChatError::NotFound(_))
        ));
        assert!(matches!(
            db.set_deleted(Uuid::new_v4(), "alice", true),
            Err(ChatError::NotFound(_))
        ));
    }

    #[test]
    fn set_deleted_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_or_get_conversation("alice", "bob").unwrap();
        db.set_deleted(id, "bob", true).unwrap();
        db.set_deleted(id, "bob", true).unwrap();
        let c = db.get_conversation(id).unwrap();
        assert!(c.is_deleted_by_b);
        assert!(!c.is_deleted_by_a);
    }

    #[test]
    fn mark_read_requires_participant() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_or_get_conversation("alice", "bob").unwrap();
        assert!(matches!(
            db.mark_read(id, "mallory"),
            Err(ChatError::NotParticipant { .. })
        ));
    }

    #[test]
    fn summary_reports_contact_account_kind() {
        let db = Database::open_in_memory().unwrap();
        db.record_login("bob", "admin").unwrap();
        db.create_or_get_conversation("alice", "bob").unwrap();

        let alice_view = db.list_conversations("alice").unwrap();
        assert_eq!(
            alice_view[0].contact_account_type,
            Some(samh_types::models::AccountKind::Admin)
        );
        let bob_view = db.list_conversations("bob").unwrap();
        assert_eq!(bob_view[0].contact_account_type, None);
    }
}
