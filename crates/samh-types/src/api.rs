use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AccountKind, Message};

// -- Errors --

/// Machine-readable error code carried in every non-2xx response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidParticipants,
    InvalidRequest,
    NotFound,
    NotParticipant,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorCode,
    pub message: String,
}

// -- Users --

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    /// Kept as a string so an unknown kind is reported as a domain error
    /// instead of a body rejection.
    pub account_type: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserSearchQuery {
    pub exclude: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSearchResult {
    pub username: String,
    pub account_type: AccountKind,
    pub last_login: DateTime<Utc>,
    pub is_online: bool,
}

// -- Conversations --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConversationRequest {
    pub user1: String,
    pub user2: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdResponse {
    pub id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MarkReadRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SetDeletedRequest {
    pub is_deleted: bool,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub message: String,
}

// -- Messages --

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendMessageRequest {
    pub conversation_id: Uuid,
    pub sender_username: String,
    pub text: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesQuery {
    pub current_user: Option<String>,
}

/// A message as seen by one requesting user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_username: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub read_by_recipient: bool,
    /// True when `sender_username` equals the `currentUser` query parameter.
    pub is_own: bool,
}

impl MessageResponse {
    pub fn from_message(message: Message, current_user: Option<&str>) -> Self {
        let is_own = current_user.is_some_and(|u| u == message.sender_username);
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_username: message.sender_username,
            text: message.text,
            created_at: message.created_at,
            read_by_recipient: message.read_by_recipient,
            is_own,
        }
    }
}

// -- Suggestions --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One line of history handed to the suggestion generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SuggestionRequest {
    pub conversation_id: String,
    pub messages: Vec<PriorMessage>,
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionResponse {
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}
