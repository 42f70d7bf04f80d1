//! Helpers shared by unit and integration tests.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};

use crate::auth::SharedSecretVerifier;
use crate::config::{AuthConfig, AuthMode, Config, DatabaseConfig, StorageConfig};
use crate::AppState;

pub const TEST_SECRET: &str = "test-shared-secret";
pub const TEST_ADMIN_EMAIL: &str = "admin@example.com";

pub fn test_config(storage_root: &Path) -> Config {
    Config {
        server: Default::default(),
        auth: AuthConfig {
            mode: AuthMode::SharedSecret,
            issuer: None,
            shared_secret: Some(TEST_SECRET.to_string()),
            bootstrap_admins: vec![TEST_ADMIN_EMAIL.to_string()],
        },
        database: DatabaseConfig {
            url: ":memory:".to_string(),
        },
        storage: StorageConfig {
            root: storage_root.display().to_string(),
            max_document_bytes: 1024 * 1024,
        },
        tracking: Default::default(),
        presence: Default::default(),
        logging: Default::default(),
        cors: Default::default(),
    }
}

/// In-memory state verifying HS256 tokens signed with [`TEST_SECRET`].
pub fn create_test_state(storage_root: &Path) -> Arc<AppState> {
    let config = test_config(storage_root);
    let verifier = Arc::new(SharedSecretVerifier::new(TEST_SECRET));
    Arc::new(AppState::new(config, verifier).expect("Failed to create test state"))
}

#[derive(serde::Serialize)]
struct TestClaims {
    sub: String,
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    auth_time: Option<i64>,
    iat: i64,
    exp: i64,
}

/// HS256 token valid for an hour. `signed_in_at` becomes `auth_time`.
pub fn generate_test_jwt(
    user_id: &str,
    email: Option<&str>,
    signed_in_at: Option<DateTime<Utc>>,
) -> String {
    let now = Utc::now();
    let claims = TestClaims {
        sub: user_id.to_string(),
        email: email.map(String::from),
        auth_time: signed_in_at.map(|t| t.timestamp()),
        iat: now.timestamp(),
        exp: (now + Duration::hours(1)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("Failed to encode JWT")
}

pub fn generate_expired_jwt(user_id: &str) -> String {
    let now = Utc::now();
    let claims = TestClaims {
        sub: user_id.to_string(),
        email: None,
        auth_time: None,
        iat: (now - Duration::hours(2)).timestamp(),
        exp: (now - Duration::hours(1)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("Failed to encode JWT")
}

/// `Authorization` header value for a token.
pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}
