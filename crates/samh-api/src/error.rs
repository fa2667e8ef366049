use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use samh_db::ChatError;
use samh_types::api::{ErrorBody, ErrorCode};

/// Error returned by every handler: a status plus `{ "error", "message" }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: status_for(code),
            body: ErrorBody {
                error: code,
                message: message.into(),
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn internal() -> Self {
        Self::new(ErrorCode::Internal, "internal server error")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> ErrorCode {
        self.body.error
    }
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidParticipants | ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::NotParticipant => StatusCode::FORBIDDEN,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err.code() {
            // Storage details stay in the log.
            ErrorCode::Internal => {
                error!("Internal error: {}", err);
                Self::internal()
            }
            code => Self::new(code, err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn domain_errors_map_to_statuses() {
        let cases = [
            (ChatError::InvalidParticipants, StatusCode::BAD_REQUEST),
            (ChatError::EmptyMessage, StatusCode::BAD_REQUEST),
            (ChatError::NotFound("conversation x".into()), StatusCode::NOT_FOUND),
            (
                ChatError::NotParticipant {
                    conversation_id: Uuid::nil(),
                    username: "mallory".into(),
                },
                StatusCode::FORBIDDEN,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn internal_errors_are_opaque() {
        let err = ApiError::from(ChatError::Internal(anyhow::anyhow!("disk on fire")));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), ErrorCode::Internal);
        assert_eq!(err.body.message, "internal server error");
    }
}
