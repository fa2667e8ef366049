use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account kind asserted by the client at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Admin,
    User,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown account kind '{0}', expected 'admin' or 'user'")]
pub struct UnknownAccountKind(pub String);

impl FromStr for AccountKind {
    type Err = UnknownAccountKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            other => Err(UnknownAccountKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(rename = "accountType")]
    pub account_kind: AccountKind,
    pub first_login: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
    pub login_count: u32,
}

/// A two-party thread. Participants are stored in sorted order so that
/// (x, y) and (y, x) name the same row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub participant_a: String,
    pub participant_b: String,
    pub last_message_text: String,
    pub last_message_time: DateTime<Utc>,
    pub is_deleted_by_a: bool,
    pub is_deleted_by_b: bool,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, username: &str) -> bool {
        self.participant_a == username || self.participant_b == username
    }

    /// The participant that is not `username`, if `username` takes part at all.
    pub fn other_participant(&self, username: &str) -> Option<&str> {
        if self.participant_a == username {
            Some(&self.participant_b)
        } else if self.participant_b == username {
            Some(&self.participant_a)
        } else {
            None
        }
    }
}

/// One row of a user's conversation list, relative to that user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: Uuid,
    pub contact_name: String,
    /// `None` when the contact never logged in.
    pub contact_account_type: Option<AccountKind>,
    pub last_message_text: String,
    pub last_message_time: DateTime<Utc>,
    pub unread_count: u32,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_username: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub read_by_recipient: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(a: &str, b: &str) -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            participant_a: a.to_string(),
            participant_b: b.to_string(),
            last_message_text: String::new(),
            last_message_time: Utc::now(),
            is_deleted_by_a: false,
            is_deleted_by_b: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn other_participant_resolves_both_sides() {
        let c = conversation("alice", "bob");
        assert_eq!(c.other_participant("alice"), Some("bob"));
        assert_eq!(c.other_participant("bob"), Some("alice"));
        assert_eq!(c.other_participant("carol"), None);
        assert!(!c.has_participant("carol"));
    }

    #[test]
    fn account_kind_parses_lowercase_only() {
        assert_eq!("admin".parse::<AccountKind>(), Ok(AccountKind::Admin));
        assert_eq!("user".parse::<AccountKind>(), Ok(AccountKind::User));
        assert!("Admin".parse::<AccountKind>().is_err());
    }

    #[test]
    fn summary_serializes_camel_case() {
        let summary = ConversationSummary {
            id: Uuid::nil(),
            contact_name: "bob".into(),
            contact_account_type: Some(AccountKind::User),
            last_message_text: "hi".into(),
            last_message_time: DateTime::from_timestamp_millis(0).unwrap(),
            unread_count: 2,
            is_deleted: false,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["contactName"], "bob");
        assert_eq!(json["contactAccountType"], "user");
        assert_eq!(json["unreadCount"], 2);
        assert_eq!(json["isDeleted"], false);
    }
}
