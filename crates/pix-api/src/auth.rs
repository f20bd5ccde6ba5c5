//! Bearer token authentication.
//!
//! Tokens are HS256 JWTs issued elsewhere; `sub` is the owner id every
//! resource is scoped by.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

/// Decoded token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Owner id
    pub sub: String,
    /// Expiration (Unix seconds)
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
}

/// Verifies bearer tokens against a shared secret.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| ApiError::unauthorized(format!("Token validation failed: {}", e)))?;
        if data.claims.sub.trim().is_empty() {
            return Err(ApiError::unauthorized("Token has an empty subject"));
        }
        Ok(data.claims)
    }
}

/// Issue a token for `sub`, valid for `ttl_secs`.
pub fn issue_token(secret: &str, sub: &str, ttl_secs: i64) -> Result<String, ApiError> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: sub.to_string(),
        exp: now + ttl_secs,
        iat: Some(now),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::internal(format!("Failed to sign token: {}", e)))
}

/// Authenticated caller extracted from the `Authorization` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub owner_id: String,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::unauthorized("Missing or malformed Authorization header"))?;

        let claims = state.jwt.verify(bearer.token())?;
        Ok(AuthUser {
            owner_id: claims.sub,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_issue_and_verify() {
        let token = issue_token(SECRET, "user-42", 60).unwrap();
        let claims = JwtVerifier::new(SECRET).verify(&token).unwrap();
        assert_eq!(claims.sub, "user-42");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_token(SECRET, "user-42", 60).unwrap();
        let err = JwtVerifier::new("other-secret").verify(&token).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn test_expired_rejected() {
        // Beyond the default 60s leeway.
        let token = issue_token(SECRET, "user-42", -600).unwrap();
        assert!(JwtVerifier::new(SECRET).verify(&token).is_err());
    }

    #[test]
    fn test_empty_subject_rejected() {
        let token = issue_token(SECRET, "  ", 60).unwrap();
        assert!(JwtVerifier::new(SECRET).verify(&token).is_err());
    }
}
