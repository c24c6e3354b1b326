use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, NaiveDateTime};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use konnect_db::models::NewOrder;
use konnect_types::api::{AckResponse, Claims, OrderListResponse, PlaceOrderResponse};
use konnect_types::models::ServiceSelection;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// Scalar fields required before anything else is looked at.
#[derive(Debug)]
struct OrderDraft {
    user_id: i64,
    influencer_id: i64,
    influencer_name: String,
    order_type: String,
}

/// POST /api/place-order - multipart order submission.
///
/// Field parts and file parts arrive interleaved on the wire. Every file
/// part is handed to an upload task as soon as its bytes are in; the
/// handler collects the completion handles and awaits the full set at
/// end-of-stream, before any validation or database work. Validation
/// failures after that point best-effort delete whatever was stored.
pub async fn place_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut upload_tasks: Vec<JoinHandle<anyhow::Result<String>>> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::Validation("Malformed multipart body".into()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if field.file_name().is_some() {
            let filename = field
                .file_name()
                .map(|f| f.to_string())
                .unwrap_or_else(|| "uploaded_file".into());
            let data = field
                .bytes()
                .await
                .map_err(|_| ApiError::Validation("Malformed file part".into()))?;

            let task_state = state.clone();
            upload_tasks.push(tokio::spawn(async move {
                task_state.storage.store(&filename, &data).await
            }));
        } else {
            let value = field
                .text()
                .await
                .map_err(|_| ApiError::Validation("Malformed field part".into()))?;
            fields.insert(name, value);
        }
    }

    // All uploads must have completed and yielded durable URLs before the
    // insert is even considered.
    let mut uploaded: Vec<String> = Vec::new();
    for task in upload_tasks {
        match task.await {
            Ok(Ok(url)) => uploaded.push(url),
            Ok(Err(e)) => {
                warn!("Attachment upload failed: {:#}", e);
                cleanup_uploads(&state, &uploaded).await;
                return Err(ApiError::Internal(e));
            }
            Err(e) => {
                cleanup_uploads(&state, &uploaded).await;
                return Err(ApiError::Internal(anyhow::anyhow!("upload task join: {e}")));
            }
        }
    }

    // The order row carries a single attachment URL; when several files
    // were sent the last one wins and the rest are removed.
    let file_url = uploaded.last().cloned();
    if uploaded.len() > 1 {
        cleanup_uploads(&state, &uploaded[..uploaded.len() - 1]).await;
    }

    match validate_and_insert(&state, &claims, fields, file_url.clone()).await {
        Ok(order) => Ok((
            StatusCode::CREATED,
            Json(PlaceOrderResponse {
                message: "Order placed successfully".into(),
                order,
            }),
        )),
        Err(e) => {
            if let Some(url) = &file_url {
                cleanup_uploads(&state, std::slice::from_ref(url)).await;
            }
            Err(e)
        }
    }
}

async fn validate_and_insert(
    state: &AppState,
    claims: &Claims,
    fields: HashMap<String, String>,
    file_url: Option<String>,
) -> ApiResult<konnect_types::models::Order> {
    let draft = required_fields(&fields)?;

    // Authorization, not validation: the claimed buyer must be the caller.
    if draft.user_id != claims.sub {
        return Err(ApiError::Forbidden("Unauthorized user ID".into()));
    }

    let db = state.db.clone();
    let influencer_id = draft.influencer_id;
    let influencer = tokio::task::spawn_blocking(move || db.get_user(influencer_id))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??;
    if influencer.is_none() {
        return Err(ApiError::NotFound("Influencer not found".into()));
    }

    let new_order = parse_order_payload(&fields, draft, file_url)?;

    let db = state.db.clone();
    let row = tokio::task::spawn_blocking(move || db.insert_order(&new_order))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??;

    info!("Order {} placed by user {}", row.id, claims.sub);
    Ok(row.into_order())
}

fn required_fields(fields: &HashMap<String, String>) -> Result<OrderDraft, ApiError> {
    let missing = || ApiError::Validation("Missing required fields".into());

    let user_id = fields
        .get("user_id")
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(missing)?;
    let influencer_id = fields
        .get("influencer_id")
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(missing)?;
    let influencer_name = fields
        .get("influencer_name")
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(missing)?
        .clone();
    let order_type = fields
        .get("order_type")
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(missing)?
        .clone();
    if !fields.contains_key("services") {
        return Err(missing());
    }

    Ok(OrderDraft {
        user_id,
        influencer_id,
        influencer_name,
        order_type,
    })
}

fn parse_order_payload(
    fields: &HashMap<String, String>,
    draft: OrderDraft,
    file_url: Option<String>,
) -> Result<NewOrder, ApiError> {
    let services_raw = fields.get("services").expect("checked in required_fields");
    let services: Vec<ServiceSelection> = serde_json::from_str(services_raw)
        .map_err(|_| ApiError::Validation("Invalid services list".into()))?;
    if services.is_empty() {
        return Err(ApiError::Validation("Services list cannot be empty".into()));
    }

    // A missing, unparseable or negative total falls back to the sum of
    // the per-service prices.
    let total_price = fields
        .get("total_price")
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|p| p.is_finite() && *p >= 0.0)
        .unwrap_or_else(|| services.iter().filter_map(|s| s.price).sum());

    let affiliated_links: Vec<String> = match fields.get("affiliated_links") {
        Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw)
            .map_err(|_| ApiError::Validation("Invalid affiliated links".into()))?,
        _ => vec![],
    };

    let (scheduled_date, scheduled_time) = match fields.get("post_datetime") {
        Some(raw) if !raw.trim().is_empty() => {
            let parsed = parse_post_datetime(raw)
                .ok_or_else(|| ApiError::Validation("Invalid scheduled date".into()))?;
            (
                Some(parsed.format("%Y-%m-%d").to_string()),
                Some(parsed.format("%H:%M:%S").to_string()),
            )
        }
        _ => (None, None),
    };

    let optional = |key: &str| {
        fields
            .get(key)
            .filter(|v| !v.trim().is_empty())
            .cloned()
    };

    Ok(NewOrder {
        user_id: draft.user_id,
        influencer_id: draft.influencer_id,
        influencer_name: draft.influencer_name,
        order_type: draft.order_type,
        services: serde_json::to_string(&services)
            .map_err(|e| ApiError::Internal(e.into()))?,
        total_price,
        description: optional("description"),
        affiliated_links: serde_json::to_string(&affiliated_links)
            .map_err(|e| ApiError::Internal(e.into()))?,
        coupon_code: optional("coupon_code"),
        scheduled_date,
        scheduled_time,
        file_url,
    })
}

fn parse_post_datetime(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
        .ok()
}

async fn cleanup_uploads(state: &AppState, urls: &[String]) {
    for url in urls {
        if let Err(e) = state.storage.delete_by_url(url).await {
            warn!("Failed to remove orphaned attachment {}: {:#}", url, e);
        }
    }
}

/// GET /api/orders - orders where the caller is buyer or influencer,
/// newest first.
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let me = claims.sub;
    let rows = tokio::task::spawn_blocking(move || db.orders_for_user(me))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??;

    Ok(Json(OrderListResponse {
        orders: rows.into_iter().map(|r| r.into_order()).collect(),
    }))
}

/// DELETE /api/orders/{id} - buyer or influencer only. The attachment is
/// removed best-effort after the row; a storage failure is logged, not
/// surfaced.
pub async fn delete_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let order = tokio::task::spawn_blocking(move || db.get_order(order_id))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??
        .ok_or_else(|| ApiError::NotFound("Order not found".into()))?;

    if order.user_id != claims.sub && order.influencer_id != claims.sub {
        return Err(ApiError::Forbidden(
            "Unauthorized to delete this order".into(),
        ));
    }

    let db = state.db.clone();
    let deleted = tokio::task::spawn_blocking(move || db.delete_order(order_id))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??
        .ok_or_else(|| ApiError::NotFound("Order not found".into()))?;

    if let Some(url) = &deleted.file_url {
        if let Err(e) = state.storage.delete_by_url(url).await {
            warn!("Failed to delete attachment for order {}: {:#}", order_id, e);
        }
    }

    info!("Order {} deleted by user {}", order_id, claims.sub);
    Ok(Json(AckResponse {
        success: true,
        message: "Order deleted successfully".into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_fields() -> HashMap<String, String> {
        let mut fields = HashMap::new();
        fields.insert("user_id".into(), "1".into());
        fields.insert("influencer_id".into(), "2".into());
        fields.insert("influencer_name".into(), "Vikram Shetty".into());
        fields.insert("order_type".into(), "promotion".into());
        fields.insert(
            "services".into(),
            r#"[{"name":"Reels/Shorts","price":499.0},{"name":"Story","price":299.0}]"#.into(),
        );
        fields.insert("total_price".into(), "798".into());
        fields
    }

    fn draft(fields: &HashMap<String, String>) -> OrderDraft {
        required_fields(fields).unwrap()
    }

    #[test]
    fn missing_required_field_is_rejected() {
        for key in ["user_id", "influencer_id", "influencer_name", "order_type", "services"] {
            let mut fields = base_fields();
            fields.remove(key);
            assert!(
                matches!(required_fields(&fields), Err(ApiError::Validation(_))),
                "expected rejection when {key} is missing"
            );
        }
    }

    #[test]
    fn non_numeric_ids_are_rejected() {
        let mut fields = base_fields();
        fields.insert("user_id".into(), "not-a-number".into());
        assert!(matches!(required_fields(&fields), Err(ApiError::Validation(_))));
    }

    #[test]
    fn empty_services_list_is_rejected() {
        let mut fields = base_fields();
        fields.insert("services".into(), "[]".into());
        let d = draft(&fields);
        assert!(matches!(
            parse_order_payload(&fields, d, None),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn unparseable_services_are_rejected() {
        let mut fields = base_fields();
        fields.insert("services".into(), "not json".into());
        let d = draft(&fields);
        assert!(matches!(
            parse_order_payload(&fields, d, None),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn invalid_total_falls_back_to_service_sum() {
        for bad in ["", "abc", "-50", "NaN"] {
            let mut fields = base_fields();
            fields.insert("total_price".into(), bad.into());
            let d = draft(&fields);
            let order = parse_order_payload(&fields, d, None).unwrap();
            assert_eq!(order.total_price, 798.0, "fallback for {bad:?}");
        }
    }

    #[test]
    fn supplied_total_wins_when_valid() {
        let fields = base_fields();
        let d = draft(&fields);
        let order = parse_order_payload(&fields, d, None).unwrap();
        assert_eq!(order.total_price, 798.0);
    }

    #[test]
    fn post_datetime_splits_into_date_and_time() {
        let mut fields = base_fields();
        fields.insert("post_datetime".into(), "2026-09-15T18:30:00Z".into());
        let d = draft(&fields);
        let order = parse_order_payload(&fields, d, None).unwrap();
        assert_eq!(order.scheduled_date.as_deref(), Some("2026-09-15"));
        assert_eq!(order.scheduled_time.as_deref(), Some("18:30:00"));
    }

    #[test]
    fn bad_post_datetime_is_rejected() {
        let mut fields = base_fields();
        fields.insert("post_datetime".into(), "next tuesday".into());
        let d = draft(&fields);
        assert!(matches!(
            parse_order_payload(&fields, d, None),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn affiliated_links_default_to_empty() {
        let fields = base_fields();
        let d = draft(&fields);
        let order = parse_order_payload(&fields, d, None).unwrap();
        assert_eq!(order.affiliated_links, "[]");

        let mut fields = base_fields();
        fields.insert(
            "affiliated_links".into(),
            r#"["https://example.com/p"]"#.into(),
        );
        let d = draft(&fields);
        let order = parse_order_payload(&fields, d, None).unwrap();
        assert!(order.affiliated_links.contains("example.com"));
    }
}
