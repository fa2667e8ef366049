use samh_types::api::ErrorCode;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The request never got a usable answer: connect failure, timeout,
    /// truncated body. Polls retry these on the next tick.
    #[error("network failure: {0}")]
    TransientNetworkFailure(String),

    /// The server answered with an error body.
    #[error("server rejected request ({status}, {code:?}): {message}")]
    Rejected {
        status: u16,
        code: ErrorCode,
        message: String,
    },

    #[error("suggestion generation failed: {0}")]
    SuggestionGenerationFailure(String),

    #[error("invalid base url '{0}'")]
    InvalidBaseUrl(String),
}

impl SyncError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransientNetworkFailure(_) | Self::SuggestionGenerationFailure(_) => true,
            Self::Rejected { status, .. } => *status >= 500,
            Self::InvalidBaseUrl(_) => false,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        Self::TransientNetworkFailure(err.to_string())
    }
}
