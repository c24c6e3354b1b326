use std::net::SocketAddr;

use axum::{
    Extension, Json,
    extract::{ConnectInfo, Path, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect},
};
use tracing::info;
use uuid::Uuid;

use konnect_db::models::parse_ts;
use konnect_types::api::{Claims, GenerateUrlRequest, GenerateUrlResponse, PromotionSummary};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// POST /api/generate-url - one promotion URL per (user, campaign).
/// Idempotent: an existing URL is returned as-is.
pub async fn generate_url(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GenerateUrlRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.campaign_id.trim().is_empty() {
        return Err(ApiError::Validation("Campaign id is required".into()));
    }

    let db = state.db.clone();
    let me = claims.sub;
    let campaign = req.campaign_id.clone();
    let existing = tokio::task::spawn_blocking(move || db.find_promotion(me, &campaign))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??;

    if let Some(promo) = existing {
        return Ok(Json(GenerateUrlResponse {
            message: "URL already generated for this campaign".into(),
            url: promo.unique_url,
        }));
    }

    let code: String = Uuid::new_v4().simple().to_string()[..8].to_string();
    let url = format!(
        "{}/api/promo/{}/{}/{}",
        state.promo_base_url, me, req.campaign_id, code
    );

    let db = state.db.clone();
    let campaign = req.campaign_id.clone();
    let stored_url = url.clone();
    let promo = tokio::task::spawn_blocking(move || db.insert_promotion(me, &campaign, &stored_url))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??;

    info!("Promotion {} created for user {}", promo.id, me);
    Ok(Json(GenerateUrlResponse {
        message: "New URL generated successfully".into(),
        url,
    }))
}

/// GET /api/promotions - the caller's promotions with unique-click counts.
/// Promotions older than 24 hours are deactivated first.
pub async fn list_promotions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let me = claims.sub;

    let summaries = tokio::task::spawn_blocking(move || {
        db.expire_stale_promotions(me)?;
        let promos = db.promotions_for(me)?;
        let mut out = Vec::with_capacity(promos.len());
        for promo in promos {
            let unique_clicks = db.unique_clicks(promo.id)?;
            out.push(PromotionSummary {
                id: promo.id,
                campaign_id: promo.campaign_id,
                unique_url: promo.unique_url,
                status: promo.status,
                created_at: parse_ts(&promo.created_at),
                unique_clicks,
            });
        }
        Ok::<_, anyhow::Error>(out)
    })
    .await
    .map_err(|e| anyhow::anyhow!("task join: {e}"))??;

    Ok(Json(summaries))
}

/// GET /api/promo/{user_id}/{campaign_id}/{code} - public click tracker.
/// Records the caller IP (unique per promotion) and redirects to the
/// campaign target.
pub async fn track_click(
    State(state): State<AppState>,
    Path((user_id, campaign_id, code)): Path<(i64, String, String)>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> ApiResult<impl IntoResponse> {
    let ip = client_ip(&headers, addr);

    let db = state.db.clone();
    let campaign = campaign_id.clone();
    let promotion_id = tokio::task::spawn_blocking(move || {
        db.find_promotion_by_code(user_id, &campaign, &code)
    })
    .await
    .map_err(|e| anyhow::anyhow!("task join: {e}"))??
    .ok_or_else(|| ApiError::NotFound("Promotion not found".into()))?;

    let db = state.db.clone();
    let ip_clone = ip.clone();
    tokio::task::spawn_blocking(move || db.record_click(promotion_id, &ip_clone))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??;

    Ok(Redirect::to(&state.promo_target_url))
}

/// Proxy-aware client address: first entry of X-Forwarded-For, else the
/// socket peer.
fn client_ip(headers: &HeaderMap, addr: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_header_wins_over_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert_eq!(client_ip(&headers, addr), "203.0.113.9");
    }

    #[test]
    fn peer_address_is_the_fallback() {
        let headers = HeaderMap::new();
        let addr: SocketAddr = "192.0.2.4:1234".parse().unwrap();
        assert_eq!(client_ip(&headers, addr), "192.0.2.4");
    }
}
