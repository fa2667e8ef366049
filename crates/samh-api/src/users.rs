use axum::extract::State;
use chrono::Utc;

use samh_db::queries::is_online;
use samh_types::api::{HealthResponse, LoginRequest, UserSearchQuery, UserSearchResult};
use samh_types::models::User;

use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::{AppState, with_db};

/// POST /users/login: record a login; creates the account the first time.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<User>, ApiError> {
    let user = with_db(&state, move |db| {
        db.record_login(&req.username, &req.account_type)
    })
    .await?;
    Ok(Json(user))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<User>, ApiError> {
    let user = with_db(&state, move |db| db.get_user(&username)).await?;
    Ok(Json(user))
}

pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    let users = with_db(&state, |db| db.list_users()).await?;
    Ok(Json(users))
}

/// GET /users/search/{query}?exclude=: contact lookup for starting a chat.
pub async fn search_users(
    State(state): State<AppState>,
    Path(query): Path<String>,
    Query(params): Query<UserSearchQuery>,
) -> Result<Json<Vec<UserSearchResult>>, ApiError> {
    let users = with_db(&state, move |db| {
        db.search_users(&query, params.exclude.as_deref())
    })
    .await?;

    let now = Utc::now();
    let results = users
        .into_iter()
        .map(|user| UserSearchResult {
            is_online: is_online(&user, now),
            username: user.username,
            account_type: user.account_kind,
            last_login: user.last_login,
        })
        .collect();
    Ok(Json(results))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        timestamp: Utc::now(),
    })
}
