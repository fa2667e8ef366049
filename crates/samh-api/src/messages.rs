use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use samh_types::api::{IdResponse, MessageResponse, MessagesQuery, SendMessageRequest};

use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::{AppState, with_db};

/// POST /messages
///
/// Only stores the message. The other participant finds it on their next poll.
pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = with_db(&state, move |db| {
        db.append_message(req.conversation_id, &req.sender_username, &req.text)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(IdResponse { id: message.id })))
}

/// GET /conversations/{id}/messages?currentUser=
///
/// Oldest first. `currentUser` only decides `isOwn`; read state is left alone.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let rows = with_db(&state, move |db| db.list_messages(conversation_id)).await?;

    let current_user = query.current_user.as_deref().filter(|u| !u.is_empty());
    let messages = rows
        .into_iter()
        .map(|m| MessageResponse::from_message(m, current_user))
        .collect();

    Ok(Json(messages))
}
