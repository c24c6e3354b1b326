use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};

use konnect_db::Database;
use konnect_db::models::UserRow;
use konnect_gateway::dispatcher::Dispatcher;
use konnect_types::api::{Claims, LoginRequest, LoginResponse, SignupRequest, SignupResponse};
use konnect_types::models::Role;

use crate::error::{ApiError, ApiResult};
use crate::otp::Mailer;
use crate::payments::PaymentClient;
use crate::storage::Storage;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub storage: Storage,
    pub payments: PaymentClient,
    pub mailer: Mailer,
    /// Shared client for OAuth token exchange and profile fetches
    pub http: reqwest::Client,
    /// Base for generated promotion URLs, e.g. "https://konnect.example.com"
    pub promo_base_url: String,
    /// Where promotion clicks are redirected
    pub promo_target_url: String,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<impl IntoResponse> {
    // Validate input
    if req.fullname.trim().is_empty() || !req.email.contains('@') {
        return Err(ApiError::Validation("Missing required fields".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters".into(),
        ));
    }

    // Check if the email is taken
    let db = state.db.clone();
    let email = req.email.clone();
    let existing = tokio::task::spawn_blocking(move || db.find_user_by_login(&email))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??;
    if existing.is_some() {
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    let password_hash = hash_password(&req.password)?;

    let db = state.db.clone();
    let user = tokio::task::spawn_blocking(move || {
        db.create_user(
            &req.fullname,
            &req.email,
            req.phone.as_deref(),
            &password_hash,
            req.role.as_str(),
        )
    })
    .await
    .map_err(|e| anyhow::anyhow!("task join: {e}"))??;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "User created".into(),
            user: user.into_user(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let identifier = req.user_input.clone();
    let user = tokio::task::spawn_blocking(move || db.find_user_by_login(&identifier))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??
        .ok_or_else(|| ApiError::Validation("User not found".into()))?;

    if !verify_password(&req.password, &user.password) {
        return Err(ApiError::Validation("Invalid credentials".into()));
    }

    let token = create_token(&state.jwt_secret, &user)?;

    Ok(Json(LoginResponse {
        message: "Login success".into(),
        token,
        user: user.into_user(),
    }))
}

pub(crate) fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hash: {e}"))?
        .to_string();
    Ok(hash)
}

pub(crate) fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn create_token(secret: &str, user: &UserRow) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        role: user.role.parse().unwrap_or(Role::Business),
        exp: (chrono::Utc::now() + chrono::Duration::days(1)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::decode_claims;

    #[test]
    fn password_hash_verifies_and_rejects() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(verify_password("correct horse battery", &hash));
        assert!(!verify_password("wrong password", &hash));
        assert!(!verify_password("correct horse battery", "not-a-hash"));
    }

    #[test]
    fn token_carries_identity_claim() {
        let user = UserRow {
            id: 9,
            fullname: "Asha Rao".into(),
            email: "asha@example.com".into(),
            phone: None,
            password: "hash".into(),
            role: "influencer".into(),
            category: None,
            profile_pic: None,
            prices: None,
            created_at: "2026-01-01 00:00:00".into(),
        };
        let token = create_token("secret", &user).unwrap();
        let claims = decode_claims(&token, "secret").unwrap();
        assert_eq!(claims.sub, 9);
        assert_eq!(claims.email, "asha@example.com");
        assert_eq!(claims.role, Role::Influencer);
    }
}
