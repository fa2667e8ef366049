use samh_types::models::AccountKind;

/// The user a [`ChatSession`](crate::ChatSession) acts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub username: String,
    pub account_kind: AccountKind,
}

impl SessionUser {
    pub fn new(username: impl Into<String>, account_kind: AccountKind) -> Self {
        Self {
            username: username.into(),
            account_kind,
        }
    }
}

/// Decides whether a user may ask for reply suggestions.
pub trait SuggestionCapability: Send + Sync {
    fn can_request_suggestions(&self, user: &SessionUser) -> bool;
}

/// Only admins get suggestions.
pub struct AdminOnly;

impl SuggestionCapability for AdminOnly {
    fn can_request_suggestions(&self, user: &SessionUser) -> bool {
        user.account_kind == AccountKind::Admin
    }
}
