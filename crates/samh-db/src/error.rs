use samh_types::api::ErrorCode;
use samh_types::models::UnknownAccountKind;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("a conversation needs two distinct, non-empty usernames")]
    InvalidParticipants,

    #[error("message text must not be empty")]
    EmptyMessage,

    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    InvalidAccountKind(#[from] UnknownAccountKind),

    #[error("{0} not found")]
    NotFound(String),

    #[error("'{username}' is not a participant of conversation {conversation_id}")]
    NotParticipant {
        conversation_id: Uuid,
        username: String,
    },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ChatError {
    pub fn conversation_not_found(id: Uuid) -> Self {
        Self::NotFound(format!("conversation {}", id))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidParticipants => ErrorCode::InvalidParticipants,
            Self::EmptyMessage | Self::InvalidRequest(_) | Self::InvalidAccountKind(_) => {
                ErrorCode::InvalidRequest
            }
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::NotParticipant { .. } => ErrorCode::NotParticipant,
            Self::Storage(_) | Self::Internal(_) => ErrorCode::Internal,
        }
    }
}
