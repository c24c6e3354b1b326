use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use tracing::info;

use konnect_types::api::{
    AckResponse, Claims, InfluencerProfile, ServiceRequestPayload, WishlistResponse,
    WishlistToggleResponse,
};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// GET /api/influencers - public directory of influencer accounts with
/// their price lists and latest provider snapshots.
pub async fn list_influencers(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let profiles = tokio::task::spawn_blocking(move || {
        let rows = db.list_influencers()?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let accounts = db.provider_accounts_for(row.id)?;
            let mut providers = serde_json::Map::new();
            for account in accounts {
                providers.insert(
                    account.provider.clone(),
                    json!({
                        "provider_user_id": account.provider_user_id,
                        "profile": account
                            .profile
                            .as_deref()
                            .and_then(|p| serde_json::from_str::<serde_json::Value>(p).ok()),
                        "posts": account
                            .posts
                            .as_deref()
                            .and_then(|p| serde_json::from_str::<serde_json::Value>(p).ok()),
                    }),
                );
            }

            let username = row
                .email
                .split('@')
                .next()
                .filter(|p| !p.is_empty())
                .unwrap_or("unknown_user")
                .to_string();

            out.push(InfluencerProfile {
                id: row.id,
                name: row.fullname.clone(),
                username,
                category: row.category.clone().unwrap_or_else(|| "General".into()),
                profile_pic: row.profile_pic.clone(),
                prices: row.prices.as_deref().and_then(|p| serde_json::from_str(p).ok()),
                providers: serde_json::Value::Object(providers),
            });
        }
        Ok::<_, anyhow::Error>(out)
    })
    .await
    .map_err(|e| anyhow::anyhow!("task join: {e}"))??;

    Ok(Json(profiles))
}

/// POST /api/wishlist/{target_id} - toggle membership. The wishlist is a
/// set: repeated toggles alternate, never duplicate.
pub async fn toggle_wishlist(
    State(state): State<AppState>,
    Path(target_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    if target_id == claims.sub {
        return Err(ApiError::Validation("Cannot wishlist yourself".into()));
    }

    let db = state.db.clone();
    let exists = tokio::task::spawn_blocking(move || db.user_exists(target_id))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??;
    if !exists {
        return Err(ApiError::NotFound("User not found".into()));
    }

    let db = state.db.clone();
    let me = claims.sub;
    let wishlisted = tokio::task::spawn_blocking(move || db.toggle_wishlist(me, target_id))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??;

    Ok(Json(WishlistToggleResponse { wishlisted }))
}

/// GET /api/wishlist
pub async fn get_wishlist(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let me = claims.sub;
    let wishlist = tokio::task::spawn_blocking(move || db.wishlist_of(me))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??;

    Ok(Json(WishlistResponse { wishlist }))
}

/// POST /api/service-request - public contact form.
pub async fn service_request(
    State(state): State<AppState>,
    Json(req): Json<ServiceRequestPayload>,
) -> ApiResult<impl IntoResponse> {
    if req.name.trim().is_empty() || req.email.trim().is_empty() || req.message.trim().is_empty() {
        return Err(ApiError::Validation("Missing required fields".into()));
    }

    let db = state.db.clone();
    let id = tokio::task::spawn_blocking(move || {
        db.insert_service_request(&req.name, &req.email, &req.message)
    })
    .await
    .map_err(|e| anyhow::anyhow!("task join: {e}"))??;

    info!("Service request {} recorded", id);
    Ok((
        StatusCode::CREATED,
        Json(AckResponse {
            success: true,
            message: "Request received".into(),
        }),
    ))
}
