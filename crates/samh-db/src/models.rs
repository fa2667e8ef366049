//! Column decoding shared by the query modules.
//!
//! Ids are stored as hyphenated UUID text and timestamps as Unix
//! milliseconds; these helpers turn them back into the `samh-types` models.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use samh_types::models::{AccountKind, Conversation, Message, User};

pub(crate) const CONVERSATION_COLUMNS: &str = "id, participant_a, participant_b, last_message_text, \
     last_message_time, is_deleted_by_a, is_deleted_by_b, created_at";

pub(crate) const MESSAGE_COLUMNS: &str =
    "id, conversation_id, sender_username, text, created_at, read_by_recipient";

pub(crate) const USER_COLUMNS: &str =
    "id, username, account_type, first_login, last_login, login_count";

pub(crate) fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

pub(crate) fn account_kind_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<AccountKind> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Maps a row selected with [`CONVERSATION_COLUMNS`].
pub(crate) fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: uuid_column(row, 0)?,
        participant_a: row.get(1)?,
        participant_b: row.get(2)?,
        last_message_text: row.get(3)?,
        last_message_time: timestamp_column(row, 4)?,
        is_deleted_by_a: row.get(5)?,
        is_deleted_by_b: row.get(6)?,
        created_at: timestamp_column(row, 7)?,
    })
}

/// Maps a row selected with [`MESSAGE_COLUMNS`].
pub(crate) fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: uuid_column(row, 0)?,
        conversation_id: uuid_column(row, 1)?,
        sender_username: row.get(2)?,
        text: row.get(3)?,
        created_at: timestamp_column(row, 4)?,
        read_by_recipient: row.get(5)?,
    })
}

/// Maps a row selected with [`USER_COLUMNS`].
pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_column(row, 0)?,
        username: row.get(1)?,
        account_kind: account_kind_column(row, 2)?,
        first_login: timestamp_column(row, 3)?,
        last_login: timestamp_column(row, 4)?,
        login_count: row.get(5)?,
    })
}
