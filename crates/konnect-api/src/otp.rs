use axum::{Json, extract::State, response::IntoResponse};
use chrono::{Duration, Utc};
use rand::Rng;
use tracing::{info, warn};

use konnect_types::api::{
    AckResponse, ResetPasswordRequest, SendOtpRequest, VerifyOtpRequest,
};

use crate::auth::{AppState, hash_password};
use crate::error::{ApiError, ApiResult};

const OTP_TTL_MINUTES: i64 = 5;

/// Outbound mail, delivered through an HTTP mail API. Without a configured
/// endpoint the message is logged instead of sent - the dev setup.
#[derive(Clone)]
pub struct Mailer {
    http: reqwest::Client,
    endpoint: Option<String>,
    api_key: String,
    sender: String,
}

impl Mailer {
    pub fn new(
        endpoint: Option<String>,
        api_key: String,
        sender: String,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            endpoint,
            api_key,
            sender,
        })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::new(
            std::env::var("MAIL_API_URL").ok(),
            std::env::var("MAIL_API_KEY").unwrap_or_default(),
            std::env::var("MAIL_FROM").unwrap_or_else(|_| "no-reply@konnect.local".into()),
        )
    }

    pub async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let Some(endpoint) = &self.endpoint else {
            info!("mail (dev mode) to {}: {}", to, subject);
            return Ok(());
        };

        let resp = self
            .http
            .post(endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "from": self.sender,
                "to": to,
                "subject": subject,
                "text": body,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            anyhow::bail!("mail API returned {}", resp.status());
        }
        Ok(())
    }
}

fn generate_otp() -> String {
    rand::rng().random_range(100_000..=999_999).to_string()
}

/// POST /api/send-otp - issue a 6-digit code valid for five minutes.
pub async fn send_otp(
    State(state): State<AppState>,
    Json(req): Json<SendOtpRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.email.trim().is_empty() {
        return Err(ApiError::Validation("Email is required".into()));
    }

    let otp = generate_otp();
    let expires_at = (Utc::now() + Duration::minutes(OTP_TTL_MINUTES)).to_rfc3339();

    let db = state.db.clone();
    let email = req.email.clone();
    let code = otp.clone();
    tokio::task::spawn_blocking(move || db.insert_otp(&email, &code, &expires_at))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??;

    let body = format!(
        "Hi, your Konnect verification code is {otp}. It is valid for {OTP_TTL_MINUTES} minutes.\n\
         Please don't share it with anyone. If you didn't request this, ignore this email."
    );
    state
        .mailer
        .send(&req.email, "Your Konnect verification code", &body)
        .await
        .map_err(|e| {
            warn!("Failed to deliver OTP mail to {}: {:#}", req.email, e);
            ApiError::Upstream("Failed to send OTP".into())
        })?;

    Ok(Json(AckResponse {
        success: true,
        message: "OTP sent successfully".into(),
    }))
}

/// POST /api/verify-otp - check the latest matching code and mark it used
/// for the following password reset.
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(req): Json<VerifyOtpRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.email.trim().is_empty() || req.otp.trim().is_empty() {
        return Err(ApiError::Validation("Email and OTP are required".into()));
    }

    let db = state.db.clone();
    let email = req.email.clone();
    let otp = req.otp.clone();
    let record = tokio::task::spawn_blocking(move || db.latest_otp(&email, &otp))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??
        .ok_or_else(|| ApiError::Validation("Invalid OTP".into()))?;

    if record.is_expired(Utc::now()) {
        return Err(ApiError::Validation("OTP expired".into()));
    }

    let db = state.db.clone();
    tokio::task::spawn_blocking(move || db.mark_otp_verified(record.id))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??;

    Ok(Json(AckResponse {
        success: true,
        message: "OTP verified successfully".into(),
    }))
}

/// POST /api/reset-password - requires a previously verified OTP for the
/// email.
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.email.trim().is_empty() || req.new_password.len() < 8 {
        return Err(ApiError::Validation(
            "Email and new password are required".into(),
        ));
    }

    let db = state.db.clone();
    let email = req.email.clone();
    let verified = tokio::task::spawn_blocking(move || db.latest_verified_otp(&email))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??;
    if verified.is_none() {
        return Err(ApiError::Unauthorized("OTP not verified".into()));
    }

    let password_hash = hash_password(&req.new_password)?;
    let db = state.db.clone();
    let email = req.email.clone();
    let updated = tokio::task::spawn_blocking(move || db.update_password(&email, &password_hash))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??;
    if updated == 0 {
        return Err(ApiError::NotFound("User not found".into()));
    }

    state
        .mailer
        .send(
            &req.email,
            "Password reset",
            "Your Konnect password has been reset. If you did not request this, contact support immediately.",
        )
        .await
        .map_err(|e| {
            warn!("Failed to deliver reset confirmation to {}: {:#}", req.email, e);
            ApiError::Upstream("Failed to send confirmation email".into())
        })?;

    Ok(Json(AckResponse {
        success: true,
        message: "Password updated and confirmation email sent".into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_is_six_digits() {
        for _ in 0..100 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn dev_mailer_accepts_without_endpoint() {
        let mailer = Mailer::new(None, String::new(), "no-reply@konnect.local".into()).unwrap();
        mailer.send("user@example.com", "subject", "body").await.unwrap();
    }
}
