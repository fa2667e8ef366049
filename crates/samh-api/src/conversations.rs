use axum::extract::State;
use uuid::Uuid;

use samh_types::api::{
    CreateConversationRequest, IdResponse, MarkReadRequest, SetDeletedRequest, StatusResponse,
};
use samh_types::models::ConversationSummary;

use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::{AppState, with_db};

/// GET /conversations/{user_id}: the caller's visible conversations.
pub async fn list_conversations(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let summaries = with_db(&state, move |db| db.list_conversations(&user_id)).await?;
    Ok(Json(summaries))
}

/// POST /conversations: create the conversation for a pair, or return the
/// existing one.
pub async fn create_conversation(
    State(state): State<AppState>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<Json<IdResponse>, ApiError> {
    let id = with_db(&state, move |db| {
        db.create_or_get_conversation(&req.user1, &req.user2)
    })
    .await?;
    Ok(Json(IdResponse { id }))
}

/// PUT /conversations/{id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<MarkReadRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    with_db(&state, move |db| db.mark_read(conversation_id, &req.user_id)).await?;
    Ok(Json(StatusResponse {
        message: "Conversation marked as read".into(),
    }))
}

/// PUT /conversations/{id}: soft delete or restore for one participant.
pub async fn set_deleted(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<SetDeletedRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let deleted = req.is_deleted;
    with_db(&state, move |db| {
        db.set_deleted(conversation_id, &req.user_id, deleted)
    })
    .await?;

    let message = if deleted {
        "Conversation deleted successfully"
    } else {
        "Conversation restored successfully"
    };
    Ok(Json(StatusResponse {
        message: message.into(),
    }))
}
