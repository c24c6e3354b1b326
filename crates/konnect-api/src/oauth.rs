use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64URL;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use konnect_types::api::Claims;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

const SESSION_TTL_MINUTES: i64 = 15;

/// A supported OAuth provider. Endpoints are fixed; credentials and the
/// redirect base come from the environment.
struct ProviderConfig {
    authorize_url: &'static str,
    token_url: &'static str,
    profile_url: Option<&'static str>,
    scope: &'static str,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

fn provider_config(name: &str) -> Option<ProviderConfig> {
    let (authorize_url, token_url, profile_url, scope, env_prefix) = match name {
        "google" => (
            "https://accounts.google.com/o/oauth2/v2/auth",
            "https://oauth2.googleapis.com/token",
            Some("https://www.googleapis.com/oauth2/v3/userinfo"),
            "openid profile email",
            "GOOGLE",
        ),
        "youtube" => (
            "https://accounts.google.com/o/oauth2/v2/auth",
            "https://oauth2.googleapis.com/token",
            Some("https://www.googleapis.com/oauth2/v3/userinfo"),
            "https://www.googleapis.com/auth/youtube.readonly https://www.googleapis.com/auth/userinfo.profile",
            "GOOGLE",
        ),
        "facebook" => (
            "https://www.facebook.com/v17.0/dialog/oauth",
            "https://graph.facebook.com/v17.0/oauth/access_token",
            Some("https://graph.facebook.com/me"),
            "public_profile,email",
            "FACEBOOK",
        ),
        "instagram" => (
            "https://api.instagram.com/oauth/authorize",
            "https://api.instagram.com/oauth/access_token",
            None,
            "user_profile,user_media",
            "INSTAGRAM",
        ),
        "twitter" => (
            "https://twitter.com/i/oauth2/authorize",
            "https://api.twitter.com/2/oauth2/token",
            Some("https://api.twitter.com/2/users/me"),
            "tweet.read users.read offline.access",
            "TWITTER",
        ),
        _ => return None,
    };

    let redirect_base = std::env::var("OAUTH_REDIRECT_BASE")
        .unwrap_or_else(|_| "http://localhost:4000".into());

    Some(ProviderConfig {
        authorize_url,
        token_url,
        profile_url,
        scope,
        client_id: std::env::var(format!("{env_prefix}_CLIENT_ID")).unwrap_or_default(),
        client_secret: std::env::var(format!("{env_prefix}_CLIENT_SECRET")).unwrap_or_default(),
        redirect_uri: format!("{redirect_base}/api/connect/{name}/callback"),
    })
}

fn generate_verifier() -> String {
    let bytes: [u8; 32] = rand::random();
    B64URL.encode(bytes)
}

fn code_challenge(verifier: &str) -> String {
    B64URL.encode(Sha256::digest(verifier.as_bytes()))
}

/// The state parameter carries the initiating user so the (cookie-less)
/// callback can bind the connection.
fn encode_state(user_id: i64) -> String {
    let nonce: [u8; 16] = rand::random();
    let payload = json!({ "nonce": B64URL.encode(nonce), "user_id": user_id });
    B64URL.encode(payload.to_string())
}

fn decode_state(state: &str) -> Option<i64> {
    let raw = B64URL.decode(state).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&raw).ok()?;
    value.get("user_id")?.as_i64()
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// GET /api/connect/{provider} - issue state + PKCE pair, persist them,
/// and hand the client to the provider's consent screen.
pub async fn connect_start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let cfg = provider_config(&provider)
        .ok_or_else(|| ApiError::NotFound("Unknown provider".into()))?;

    let verifier = generate_verifier();
    let challenge = code_challenge(&verifier);
    let state_blob = encode_state(claims.sub);
    let expires = (Utc::now() + Duration::minutes(SESSION_TTL_MINUTES)).to_rfc3339();

    let db = state.db.clone();
    let blob = state_blob.clone();
    tokio::task::spawn_blocking(move || db.create_auth_session(&blob, &verifier, &expires))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??;

    let url = reqwest::Url::parse_with_params(
        cfg.authorize_url,
        &[
            ("response_type", "code"),
            ("client_id", cfg.client_id.as_str()),
            ("redirect_uri", cfg.redirect_uri.as_str()),
            ("scope", cfg.scope),
            ("state", state_blob.as_str()),
            ("code_challenge", challenge.as_str()),
            ("code_challenge_method", "S256"),
        ],
    )
    .map_err(|e| ApiError::Internal(e.into()))?;

    info!("user {} starting {} connect", claims.sub, provider);
    Ok(Redirect::temporary(url.as_str()))
}

/// GET /api/connect/{provider}/callback - consume the stored state (single
/// use, expiry-checked), exchange the code, and record the provider
/// snapshot for the initiating user.
pub async fn connect_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<impl IntoResponse> {
    let cfg = provider_config(&provider)
        .ok_or_else(|| ApiError::NotFound("Unknown provider".into()))?;

    let (code, state_param) = match (query.code, query.state) {
        (Some(code), Some(state_param)) => (code, state_param),
        _ => return Err(ApiError::Validation("Missing code or state".into())),
    };

    let db = state.db.clone();
    let blob = state_param.clone();
    let session = tokio::task::spawn_blocking(move || db.consume_auth_session(&blob))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??;

    let session = match session {
        Some(s) if !s.is_expired(Utc::now()) => s,
        _ => {
            return Err(ApiError::Validation(
                "Invalid or expired state/verifier. Please try connecting again.".into(),
            ));
        }
    };

    let user_id = decode_state(&state_param)
        .ok_or_else(|| ApiError::Validation("Invalid user ID in state".into()))?;

    // Exchange the authorization code
    let token_resp = state
        .http
        .post(cfg.token_url)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("client_id", cfg.client_id.as_str()),
            ("client_secret", cfg.client_secret.as_str()),
            ("redirect_uri", cfg.redirect_uri.as_str()),
            ("code_verifier", session.code_verifier.as_str()),
        ])
        .send()
        .await
        .map_err(|e| ApiError::Upstream(format!("Token exchange failed: {e}")))?;

    if !token_resp.status().is_success() {
        let status = token_resp.status();
        let body = token_resp.text().await.unwrap_or_default();
        warn!("{} token exchange returned {}: {}", provider, status, body);
        return Err(ApiError::Upstream(format!(
            "Failed to obtain access token ({status}): {body}"
        )));
    }

    let token: TokenResponse = token_resp
        .json()
        .await
        .map_err(|e| ApiError::Upstream(format!("Malformed token response: {e}")))?;

    // Fetch a profile snapshot where the provider exposes one
    let (provider_user_id, profile_json) = match cfg.profile_url {
        Some(profile_url) => {
            let resp = state
                .http
                .get(profile_url)
                .bearer_auth(&token.access_token)
                .send()
                .await
                .map_err(|e| ApiError::Upstream(format!("Profile fetch failed: {e}")))?;
            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(ApiError::Upstream(format!(
                    "Failed to retrieve profile data ({status}): {body}"
                )));
            }
            let profile: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| ApiError::Upstream(format!("Malformed profile response: {e}")))?;
            let id = profile
                .get("sub")
                .or_else(|| profile.get("id"))
                .or_else(|| profile.get("data").and_then(|d| d.get("id")))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            (id, Some(profile.to_string()))
        }
        None => (None, None),
    };

    let db = state.db.clone();
    let provider_name = provider.clone();
    tokio::task::spawn_blocking(move || {
        db.upsert_provider_account(
            user_id,
            &provider_name,
            provider_user_id.as_deref(),
            profile_json.as_deref(),
            None,
        )
    })
    .await
    .map_err(|e| anyhow::anyhow!("task join: {e}"))??;

    info!("user {} connected {}", user_id, provider);

    let done = std::env::var("CONNECT_DONE_REDIRECT").unwrap_or_else(|_| "/".into());
    Ok(Redirect::to(&done).into_response())
}

/// GET /api/connections - the caller's linked providers.
pub async fn list_connections(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let me = claims.sub;
    let accounts = tokio::task::spawn_blocking(move || db.provider_accounts_for(me))
        .await
        .map_err(|e| anyhow::anyhow!("task join: {e}"))??;

    let connections: Vec<serde_json::Value> = accounts
        .into_iter()
        .map(|a| {
            json!({
                "provider": a.provider,
                "provider_user_id": a.provider_user_id,
                "updated_at": a.updated_at,
            })
        })
        .collect();

    Ok(Json(connections))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_is_base64url_sha256_of_verifier() {
        let verifier = "test-verifier-value";
        let expected = B64URL.encode(Sha256::digest(verifier.as_bytes()));
        assert_eq!(code_challenge(verifier), expected);
    }

    #[test]
    fn verifiers_are_unique_and_url_safe() {
        let a = generate_verifier();
        let b = generate_verifier();
        assert_ne!(a, b);
        assert!(!a.contains('+') && !a.contains('/') && !a.contains('='));
    }

    #[test]
    fn state_roundtrips_user_id() {
        let state = encode_state(77);
        assert_eq!(decode_state(&state), Some(77));
        assert_ne!(encode_state(77), encode_state(77));
    }

    #[test]
    fn garbage_state_decodes_to_none() {
        assert_eq!(decode_state("not base64!!"), None);
        assert_eq!(decode_state(&B64URL.encode("{\"no_user\":1}")), None);
    }

    #[test]
    fn known_providers_resolve_unknown_do_not() {
        for name in ["google", "youtube", "facebook", "instagram", "twitter"] {
            assert!(provider_config(name).is_some(), "{name} should resolve");
        }
        assert!(provider_config("myspace").is_none());
    }
}
