//! Bearer-token authentication.
//!
//! Token issuance is delegated to an external provider. This module only
//! verifies tokens and turns their claims into an [`AuthUser`]; the matching
//! identity record is resolved by the [`CurrentUser`] extractor.

mod extract;
mod jwks;
mod secret;

pub use extract::{require, CurrentUser};
pub use jwks::JwksClient;
pub use secret::SharedSecretVerifier;

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated caller extracted from a verified token.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
    /// OIDC `auth_time`: when the session behind this token was established.
    pub signed_in_at: Option<DateTime<Utc>>,
    /// Token issue time. Changes on every refresh.
    pub issued_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingHeader,
    #[error("Invalid Authorization header format")]
    InvalidFormat,
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("JWKS fetch error: {0}")]
    JwksFetchError(String),
    #[error("Key not found for kid: {0}")]
    KeyNotFound(String),
}

/// JWT claims understood by the back office.
#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// OIDC `auth_time`: when the user actually signed in.
    #[serde(default)]
    pub auth_time: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
    pub exp: u64,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        let instant = |secs: i64| Utc.timestamp_opt(secs, 0).single();

        AuthUser {
            sub: claims.sub,
            email: claims.email,
            name: claims.name,
            signed_in_at: claims.auth_time.and_then(instant),
            issued_at: claims.iat.and_then(instant),
        }
    }
}

/// Verifies bearer tokens.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Validate a raw token.
    async fn validate_token(&self, token: &str) -> Result<AuthUser, AuthError>;

    /// Authenticate a request by validating its Bearer token.
    async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthUser, AuthError> {
        let token = bearer_token(headers)?;
        self.validate_token(token).await
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(AuthError::MissingHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidFormat)?;

    auth_header
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::InvalidFormat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::AUTHORIZATION;

    fn headers_with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value.parse().unwrap());
        headers
    }

    fn claims(auth_time: Option<i64>, iat: Option<i64>) -> Claims {
        Claims {
            sub: "user123".to_string(),
            email: Some("user@example.com".to_string()),
            name: None,
            auth_time,
            iat,
            exp: 0,
        }
    }

    #[test]
    fn test_bearer_token_extraction_valid() {
        let headers = headers_with_auth("Bearer eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9.test");
        assert_eq!(
            bearer_token(&headers).unwrap(),
            "eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9.test"
        );
    }

    #[test]
    fn test_bearer_token_extraction_basic_auth() {
        let headers = headers_with_auth("Basic dXNlcjpwYXNz");
        assert!(matches!(bearer_token(&headers), Err(AuthError::InvalidFormat)));
    }

    #[test]
    fn test_bearer_token_empty() {
        let headers = headers_with_auth("Bearer ");
        assert!(matches!(bearer_token(&headers), Err(AuthError::InvalidFormat)));
    }

    #[test]
    fn test_empty_headers_has_no_auth() {
        assert!(matches!(bearer_token(&HeaderMap::new()), Err(AuthError::MissingHeader)));
    }

    #[test]
    fn test_claims_keep_auth_time_and_iat_apart() {
        let user = AuthUser::from(claims(Some(1_700_000_000), Some(1_700_003_600)));
        assert_eq!(user.signed_in_at.unwrap().timestamp(), 1_700_000_000);
        assert_eq!(user.issued_at.unwrap().timestamp(), 1_700_003_600);
    }

    #[test]
    fn test_missing_auth_time_is_not_replaced_by_iat() {
        let user = AuthUser::from(claims(None, Some(1_700_003_600)));
        assert!(user.signed_in_at.is_none());
        assert_eq!(user.issued_at.unwrap().timestamp(), 1_700_003_600);

        let user = AuthUser::from(claims(None, None));
        assert!(user.signed_in_at.is_none() && user.issued_at.is_none());
    }

    #[test]
    fn test_auth_error_messages() {
        assert_eq!(AuthError::MissingHeader.to_string(), "Missing Authorization header");
        assert_eq!(
            AuthError::InvalidFormat.to_string(),
            "Invalid Authorization header format"
        );
        assert!(AuthError::KeyNotFound("kid123".to_string())
            .to_string()
            .contains("Key not found for kid"));
    }
}
