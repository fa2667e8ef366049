use chrono::{DateTime, Utc};
use rusqlite::{Transaction, params};
use tracing::{debug, info};
use uuid::{NoContext, Timestamp, Uuid};

use samh_types::models::Message;

use crate::conversations::query_conversation;
use crate::models::{MESSAGE_COLUMNS, message_from_row};
use crate::{ChatError, Database, Result};

impl Database {
    /// Append a message and refresh the conversation's last-message cache in
    /// the same transaction.
    ///
    /// `created_at` never goes backwards within a conversation, so creation
    /// order and append order agree even if the wall clock steps back.
    /// Message ids are UUIDv7 and strictly increase in append order.
    pub fn append_message(
        &self,
        conversation_id: Uuid,
        sender_username: &str,
        text: &str,
    ) -> Result<Message> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let conversation = query_conversation(&tx, conversation_id)?
                .ok_or_else(|| ChatError::conversation_not_found(conversation_id))?;
            if !conversation.has_participant(sender_username) {
                return Err(ChatError::NotParticipant {
                    conversation_id,
                    username: sender_username.to_string(),
                });
            }

            let newest: Option<i64> = tx.query_row(
                "SELECT MAX(created_at) FROM messages WHERE conversation_id = ?1",
                [conversation_id.to_string()],
                |row| row.get(0),
            )?;
            let now = Utc::now().timestamp_millis();
            let created_at = newest.map_or(now, |n| n.max(now));

            let id = next_message_id(&tx, created_at)?;
            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_username, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.to_string(),
                    conversation_id.to_string(),
                    sender_username,
                    text,
                    created_at
                ],
            )?;
            tx.execute(
                "UPDATE conversations SET last_message_text = ?1, last_message_time = ?2
                 WHERE id = ?3",
                params![text, created_at, conversation_id.to_string()],
            )?;
            tx.commit()?;

            info!("New message {} in {} sent by {}", id, conversation_id, sender_username);
            Ok(Message {
                id,
                conversation_id,
                sender_username: sender_username.to_string(),
                text: text.to_string(),
                created_at: DateTime::from_timestamp_millis(created_at)
                    .ok_or_else(|| anyhow::anyhow!("timestamp out of range: {}", created_at))?,
                read_by_recipient: false,
            })
        })
    }

    /// Every message of the conversation, oldest first. Never touches read state.
    pub fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            if query_conversation(conn, conversation_id)?.is_none() {
                return Err(ChatError::conversation_not_found(conversation_id));
            }

            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at ASC, seq ASC"
            ))?;
            let rows = stmt
                .query_map([conversation_id.to_string()], message_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            debug!("Loaded {} messages for {}", rows.len(), conversation_id);
            Ok(rows)
        })
    }
}

/// A UUIDv7 stamped with `created_at`, bumped past the newest stored id
/// when the clock has not moved on since.
fn next_message_id(tx: &Transaction<'_>, created_at: i64) -> Result<Uuid> {
    let millis = u64::try_from(created_at)
        .map_err(|_| anyhow::anyhow!("timestamp before the epoch: {}", created_at))?;
    let candidate = Uuid::new_v7(Timestamp::from_unix(
        NoContext,
        millis / 1000,
        (millis % 1000) as u32 * 1_000_000,
    ));

    // Hyphenated lowercase text sorts the same as the id bytes.
    let newest: Option<String> =
        tx.query_row("SELECT MAX(id) FROM messages", [], |row| row.get(0))?;
    let Some(newest) = newest else {
        return Ok(candidate);
    };
    let newest = Uuid::parse_str(&newest).map_err(anyhow::Error::from)?;
    if candidate > newest {
        return Ok(candidate);
    }
    let bumped = newest
        .as_u128()
        .checked_add(1)
        .ok_or_else(|| anyhow::anyhow!("message id space exhausted"))?;
    Ok(Uuid::from_u128(bumped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_text() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_or_get_conversation("alice", "bob").unwrap();
        assert!(matches!(
            db.append_message(id, "alice", " \n\t"),
            Err(ChatError::EmptyMessage)
        ));
    }

    #[test]
    fn rejects_outsider_and_unknown_conversation() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_or_get_conversation("alice", "bob").unwrap();
        assert!(matches!(
            db.append_message(id, "carol", "hi"),
            Err(ChatError::NotParticipant { .. })
        ));
        assert!(matches!(
            db.append_message(Uuid::new_v4(), "alice", "hi"),
            Err(ChatError::NotFound(_))
        ));
        assert!(db.list_messages(id).unwrap().is_empty());
    }

    #[test]
    fn list_messages_of_unknown_conversation_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.list_messages(Uuid::new_v4()),
            Err(ChatError::NotFound(_))
        ));
    }

    #[test]
    fn created_at_never_goes_backwards() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_or_get_conversation("alice", "bob").unwrap();
        let future = Utc::now().timestamp_millis() + 60_000;
        db.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, sender_username, text, created_at)
                 VALUES (?1, ?2, 'alice', 'from the future', ?3)",
                params![Uuid::new_v4().to_string(), id.to_string(), future],
            )?;
            Ok(())
        })
        .unwrap();

        let appended = db.append_message(id, "bob", "now").unwrap();
        assert_eq!(appended.created_at.timestamp_millis(), future);

        let texts: Vec<_> = db
            .list_messages(id)
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["from the future", "now"]);
    }

    #[test]
    fn ids_increase_in_append_order() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_or_get_conversation("alice", "bob").unwrap();
        let sent: Vec<Uuid> = (0..20)
            .map(|i| db.append_message(id, "alice", &format!("msg {}", i)).unwrap().id)
            .collect();
        assert!(sent.windows(2).all(|w| w[0] < w[1]));
        assert!(sent.iter().all(|m| m.get_version_num() == 7));

        let listed: Vec<Uuid> = db.list_messages(id).unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(listed, sent);
    }

    #[test]
    fn ids_keep_increasing_when_the_clock_steps_back() {
        let db = Database::open_in_memory().unwrap();
        let first = db.create_or_get_conversation("alice", "bob").unwrap();
        let other = db.create_or_get_conversation("alice", "carol").unwrap();

        // A message in another conversation stamped a minute ahead.
        let future = Utc::now().timestamp_millis() + 60_000;
        let ahead = Uuid::new_v7(Timestamp::from_unix(
            NoContext,
            (future / 1000) as u64,
            (future % 1000) as u32 * 1_000_000,
        ));
        db.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, sender_username, text, created_at)
                 VALUES (?1, ?2, 'carol', 'from the future', ?3)",
                params![ahead.to_string(), other.to_string(), future],
            )?;
            Ok(())
        })
        .unwrap();

        let a = db.append_message(first, "alice", "one").unwrap().id;
        let b = db.append_message(first, "bob", "two").unwrap().id;
        assert!(ahead < a);
        assert!(a < b);
    }

    #[test]
    fn listing_does_not_mark_read() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_or_get_conversation("alice", "bob").unwrap();
        db.append_message(id, "alice", "hi").unwrap();
        db.list_messages(id).unwrap();
        assert_eq!(db.list_conversations("bob").unwrap()[0].unread_count, 1);
    }
}
