use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use super::{AuthError, AuthUser, Claims, TokenVerifier};

/// Verifies HS256 tokens signed with a shared secret.
///
/// Used when the token issuer is a trusted sibling service rather than an
/// OIDC provider, and in tests.
pub struct SharedSecretVerifier {
    key: DecodingKey,
}

impl SharedSecretVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[async_trait]
impl TokenVerifier for SharedSecretVerifier {
    async fn validate_token(&self, token: &str) -> Result<AuthUser, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;

        let token_data = decode::<Claims>(token, &self.key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(token_data.claims.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{generate_expired_jwt, generate_test_jwt, TEST_SECRET};
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_valid_token() {
        let verifier = SharedSecretVerifier::new(TEST_SECRET);
        let signed_in = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let token = generate_test_jwt("user123", Some("user@example.com"), Some(signed_in));

        let user = verifier.validate_token(&token).await.unwrap();
        assert_eq!(user.sub, "user123");
        assert_eq!(user.email.as_deref(), Some("user@example.com"));
        assert_eq!(user.signed_in_at, Some(signed_in));
    }

    #[tokio::test]
    async fn test_wrong_secret_is_rejected() {
        let verifier = SharedSecretVerifier::new("another-secret");
        let token = generate_test_jwt("user123", None, None);

        let result = verifier.validate_token(&token).await;
        assert!(matches!(result, Err(AuthError::InvalidToken(_))));
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let verifier = SharedSecretVerifier::new(TEST_SECRET);
        let token = generate_expired_jwt("user123");

        let result = verifier.validate_token(&token).await;
        assert!(matches!(result, Err(AuthError::InvalidToken(_))));
    }
}
