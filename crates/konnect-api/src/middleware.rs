use axum::{
    extract::Request,
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use konnect_types::api::Claims;

/// Decode and validate a bearer token. Shared by the HTTP middleware and
/// the WebSocket upgrade handshake.
pub fn decode_claims(token: &str, secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}

pub fn jwt_secret_from_env() -> String {
    std::env::var("KONNECT_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into())
}

/// Extract and validate JWT from Authorization header.
pub async fn require_auth(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let secret = jwt_secret_from_env();

    let claims = decode_claims(token, &secret).ok_or(StatusCode::FORBIDDEN)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use konnect_types::models::Role;

    fn token_for(sub: i64, secret: &str) -> String {
        let claims = Claims {
            sub,
            email: "user@example.com".into(),
            role: Role::Influencer,
            exp: (chrono::Utc::now() + chrono::Duration::days(1)).timestamp() as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_roundtrips_claims() {
        let token = token_for(42, "secret-a");
        let claims = decode_claims(&token, "secret-a").unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.role, Role::Influencer);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = token_for(42, "secret-a");
        assert!(decode_claims(&token, "secret-b").is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = Claims {
            sub: 42,
            email: "user@example.com".into(),
            role: Role::Business,
            exp: (chrono::Utc::now() - chrono::Duration::hours(1)).timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret-a"),
        )
        .unwrap();
        assert!(decode_claims(&token, "secret-a").is_none());
    }
}
