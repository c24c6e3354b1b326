use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use konnect_db::models::parse_ts;
use konnect_gateway::connection::persist_and_deliver;
use konnect_types::api::{
    AckResponse, ChatHistoryResponse, ChatListResponse, ChatSummary, Claims, SendMessageRequest,
    UserListResponse, UserSummary,
};
use konnect_types::models::Role;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    /// Cursor: fetch messages older than this id
    pub before_id: Option<i64>,
    pub limit: Option<u32>,
}

/// POST /api/send - persist a message and deliver it to both parties'
/// rooms. The insert is the durability point; gateway delivery after it is
/// best-effort.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.receiver_id <= 0 || req.content.trim().is_empty() {
        return Err(ApiError::Validation("Missing required fields".into()));
    }

    let db = state.db.clone();
    let receiver_id = req.receiver_id;
    let exists = tokio::task::spawn_blocking(move || db.user_exists(receiver_id))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??;
    if !exists {
        return Err(ApiError::NotFound("Receiver not found".into()));
    }

    persist_and_deliver(
        &state.db,
        &state.dispatcher,
        claims.sub,
        req.receiver_id,
        req.content,
        None,
    )
    .await?;

    Ok(Json(AckResponse {
        success: true,
        message: "Message sent".into(),
    }))
}

/// GET /api/chat/{user_id} - full symmetric history with the given user,
/// timestamp ascending. `before_id`/`limit` page backwards through older
/// messages.
pub async fn get_chat(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<ChatQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let me = claims.sub;
    let rows = tokio::task::spawn_blocking(move || {
        db.chat_between(me, user_id, query.before_id, query.limit)
    })
    .await
    .map_err(|e| anyhow::anyhow!("task join: {e}"))??;

    Ok(Json(ChatHistoryResponse {
        messages: rows.into_iter().map(|r| r.into_message()).collect(),
    }))
}

/// GET /api/chats - one entry per conversation partner with the last
/// message exchanged.
pub async fn list_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let me = claims.sub;
    let rows = tokio::task::spawn_blocking(move || db.chat_partners(me))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??;

    let chats = rows
        .into_iter()
        .map(|r| ChatSummary {
            other_user_id: r.other_user_id,
            other_user_name: r.other_user_name,
            last_message: r.last_message,
            timestamp: parse_ts(&r.timestamp),
        })
        .collect();

    Ok(Json(ChatListResponse { chats }))
}

/// GET /api/users - everyone except the caller, for starting new chats.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let me = claims.sub;
    let rows = tokio::task::spawn_blocking(move || db.list_users_except(me))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??;

    let users = rows
        .into_iter()
        .map(|r| UserSummary {
            id: r.id,
            fullname: r.fullname,
            email: r.email,
            role: r.role.parse().unwrap_or(Role::Business),
        })
        .collect();

    Ok(Json(UserListResponse { users }))
}
