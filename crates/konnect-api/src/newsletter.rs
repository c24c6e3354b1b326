use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use konnect_types::api::{AckResponse, NewsletterRequest};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// POST /api/subscribe - upsert: resubscribing a known address flips it
/// back to subscribed.
pub async fn subscribe(
    State(state): State<AppState>,
    Json(req): Json<NewsletterRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.email.trim().is_empty() {
        return Err(ApiError::Validation("Email is required".into()));
    }

    let db = state.db.clone();
    let email = req.email.to_lowercase();
    tokio::task::spawn_blocking(move || db.subscribe_newsletter(&email))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??;

    Ok((
        StatusCode::CREATED,
        Json(AckResponse {
            success: true,
            message: "Successfully subscribed".into(),
        }),
    ))
}

/// POST /api/unsubscribe
pub async fn unsubscribe(
    State(state): State<AppState>,
    Json(req): Json<NewsletterRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.email.trim().is_empty() {
        return Err(ApiError::Validation("Email is required".into()));
    }

    let db = state.db.clone();
    let email = req.email.to_lowercase();
    let found = tokio::task::spawn_blocking(move || db.unsubscribe_newsletter(&email))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??;

    if !found {
        return Err(ApiError::NotFound("Email not found".into()));
    }

    Ok(Json(AckResponse {
        success: true,
        message: "Successfully unsubscribed".into(),
    }))
}
