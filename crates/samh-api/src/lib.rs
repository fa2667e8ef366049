//! HTTP surface of the chat service.
//!
//! Identity is whatever username the client puts in the path or body; there
//! is no authentication layer in front of these routes.

pub mod conversations;
pub mod error;
pub mod extract;
pub mod messages;
pub mod nim;
pub mod suggestions;
pub mod users;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};
use tracing::error;

use samh_db::Database;

use crate::error::ApiError;
use crate::suggestions::SuggestionService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub suggestions: SuggestionService,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(users::health))
        .route("/users", get(users::list_users))
        .route("/users/login", post(users::login))
        .route("/users/search/{query}", get(users::search_users))
        .route("/users/{username}", get(users::get_user))
        .route("/conversations", post(conversations::create_conversation))
        .route(
            "/conversations/{id}",
            get(conversations::list_conversations).put(conversations::set_deleted),
        )
        .route("/conversations/{id}/messages", get(messages::get_messages))
        .route("/conversations/{id}/read", put(conversations::mark_read))
        .route("/messages", post(messages::send_message))
        .route(
            "/chat/generate-quick-messages",
            post(suggestions::generate_quick_messages),
        )
        .with_state(state)
}

/// Run a blocking database call off the async runtime.
pub(crate) async fn with_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> samh_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal()
        })?
        .map_err(ApiError::from)
}
