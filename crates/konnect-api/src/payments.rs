use axum::{Extension, Json, extract::State, response::IntoResponse};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{info, warn};

use konnect_types::api::{
    Claims, CreatePaymentOrderRequest, CreatePaymentOrderResponse, VerifyPaymentRequest,
    VerifyPaymentResponse,
};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

type HmacSha256 = Hmac<Sha256>;

const PROVIDER_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Client for the Razorpay-compatible payment gateway. Order creation goes
/// over HTTPS with basic auth; callback signatures are verified locally
/// against the key secret.
#[derive(Clone)]
pub struct PaymentClient {
    http: reqwest::Client,
    key_id: String,
    key_secret: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ProviderOrder {
    id: String,
}

impl PaymentClient {
    pub fn new(key_id: String, key_secret: String, base_url: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            key_id,
            key_secret,
            base_url,
        })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let key_id =
            std::env::var("RAZORPAY_KEY_ID").unwrap_or_else(|_| "rzp_test_placeholder".into());
        let key_secret = std::env::var("RAZORPAY_KEY_SECRET").unwrap_or_default();
        let base_url = std::env::var("RAZORPAY_BASE_URL")
            .unwrap_or_else(|_| "https://api.razorpay.com/v1".into());
        Self::new(key_id, key_secret, base_url)
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Create a provider-side order and return its id. Amount is in minor
    /// currency units.
    pub async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> anyhow::Result<String> {
        let resp = self
            .http
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&serde_json::json!({
                "amount": amount,
                "currency": currency,
                "receipt": receipt,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("payment provider returned {status}: {body}");
        }

        let order: ProviderOrder = resp.json().await?;
        Ok(order.id)
    }

    /// Recompute the callback HMAC over "order_id|payment_id" and compare
    /// it to the supplied hex signature. Comparison happens on the decoded
    /// bytes via the MAC itself, so it is constant time.
    pub fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        let Ok(sig_bytes) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(self.key_secret.as_bytes()) else {
            return false;
        };
        mac.update(format!("{order_id}|{payment_id}").as_bytes());
        mac.verify_slice(&sig_bytes).is_ok()
    }
}

/// POST /api/create-payment-order - create the provider-side order the
/// client pays against.
pub async fn create_payment_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePaymentOrderRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.amount <= 0 || req.currency.trim().is_empty() {
        return Err(ApiError::Validation("Invalid amount or currency".into()));
    }

    let receipt = format!("order_{}", req.order_id);
    let provider_order_id = state
        .payments
        .create_order(req.amount, &req.currency, &receipt)
        .await
        .map_err(|e| {
            warn!("Payment order creation failed for user {}: {:#}", claims.sub, e);
            ApiError::Upstream("Failed to create payment order".into())
        })?;

    Ok(Json(CreatePaymentOrderResponse {
        razorpay_order_id: provider_order_id,
        key: state.payments.key_id().to_string(),
    }))
}

/// POST /api/verify-payment - the only path that moves an order out of
/// Pending. A signature mismatch is terminal: 400, no state change.
pub async fn verify_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<VerifyPaymentRequest>,
) -> ApiResult<impl IntoResponse> {
    if !state.payments.verify_signature(
        &req.razorpay_order_id,
        &req.razorpay_payment_id,
        &req.razorpay_signature,
    ) {
        warn!(
            "Invalid payment signature for order {} from user {}",
            req.order_id, claims.sub
        );
        return Err(ApiError::Validation("Invalid payment signature".into()));
    }

    let db = state.db.clone();
    let order_id = req.order_id;
    let row = tokio::task::spawn_blocking(move || db.complete_order(order_id))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??
        .ok_or_else(|| ApiError::NotFound("Order not found".into()))?;

    info!("Order {} marked Completed after payment verification", row.id);
    Ok(Json(VerifyPaymentResponse {
        message: "Payment verified and order updated successfully".into(),
        order: row.into_order(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with_secret(secret: &str) -> PaymentClient {
        PaymentClient::new(
            "rzp_test_key".into(),
            secret.into(),
            "https://api.razorpay.test/v1".into(),
        )
        .unwrap()
    }

    fn sign(secret: &str, order_id: &str, payment_id: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{order_id}|{payment_id}").as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn valid_signature_passes() {
        let client = client_with_secret("shhh");
        let sig = sign("shhh", "order_abc", "pay_def");
        assert!(client.verify_signature("order_abc", "pay_def", &sig));
    }

    #[test]
    fn forged_signature_fails() {
        let client = client_with_secret("shhh");
        let forged = sign("other-secret", "order_abc", "pay_def");
        assert!(!client.verify_signature("order_abc", "pay_def", &forged));
    }

    #[test]
    fn swapped_ids_fail() {
        let client = client_with_secret("shhh");
        let sig = sign("shhh", "order_abc", "pay_def");
        assert!(!client.verify_signature("pay_def", "order_abc", &sig));
    }

    #[test]
    fn garbage_signature_fails_without_panicking() {
        let client = client_with_secret("shhh");
        assert!(!client.verify_signature("order_abc", "pay_def", "not hex at all"));
        assert!(!client.verify_signature("order_abc", "pay_def", ""));
        assert!(!client.verify_signature("order_abc", "pay_def", "deadbeef"));
    }
}
