use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;

use super::{AuthError, AuthUser, Claims, TokenVerifier};

/// JWKS key set response.
#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    #[allow(dead_code)]
    alg: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OidcConfig {
    jwks_uri: String,
}

/// Client for fetching and caching JWKS keys of an OIDC issuer.
pub struct JwksClient {
    http_client: Client,
    jwks_uri: String,
    keys: Arc<RwLock<HashMap<String, DecodingKey>>>,
    issuer: String,
}

impl JwksClient {
    pub async fn new(issuer: &str) -> Result<Self, AuthError> {
        let http_client = Client::new();

        // Fetch OIDC configuration to get JWKS URI
        let config_url = format!(
            "{}/.well-known/openid-configuration",
            issuer.trim_end_matches('/')
        );
        let config: OidcConfig = http_client
            .get(&config_url)
            .send()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?;

        let client = Self {
            http_client,
            jwks_uri: config.jwks_uri,
            keys: Arc::new(RwLock::new(HashMap::new())),
            issuer: issuer.to_string(),
        };

        client.refresh_keys().await?;

        Ok(client)
    }

    async fn refresh_keys(&self) -> Result<(), AuthError> {
        tracing::info!("Fetching JWKS from {}", self.jwks_uri);

        let response: JwksResponse = self
            .http_client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?;

        let mut keys = self.keys.write().await;
        keys.clear();

        for jwk in response.keys {
            if jwk.kty != "RSA" {
                continue;
            }
            if let (Some(n), Some(e)) = (&jwk.n, &jwk.e) {
                match DecodingKey::from_rsa_components(n, e) {
                    Ok(key) => {
                        keys.insert(jwk.kid.clone(), key);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse RSA key {}: {}", jwk.kid, e);
                    }
                }
            }
        }

        tracing::info!("Loaded {} JWKS keys", keys.len());
        Ok(())
    }

    /// Number of cached keys.
    pub async fn key_count(&self) -> usize {
        self.keys.read().await.len()
    }

    fn decode_with(&self, token: &str, key: &DecodingKey) -> Result<AuthUser, AuthError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_aud = false;

        let token_data = decode::<Claims>(token, key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(token_data.claims.into())
    }
}

#[async_trait]
impl TokenVerifier for JwksClient {
    async fn validate_token(&self, token: &str) -> Result<AuthUser, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("Missing kid in token header".to_string()))?;

        {
            let keys = self.keys.read().await;
            if let Some(key) = keys.get(&kid) {
                return self.decode_with(token, key);
            }
        }

        // Unknown kid: the issuer may have rotated its keys
        self.refresh_keys().await?;
        let keys = self.keys.read().await;
        let key = keys
            .get(&kid)
            .ok_or_else(|| AuthError::KeyNotFound(kid.clone()))?;
        self.decode_with(token, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_issuer() -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jwks_uri": format!("{}/.well-known/jwks.json", mock_server.uri()),
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "keys": [
                    { "kid": "test-key", "kty": "RSA", "alg": "RS256", "n": "test", "e": "AQAB" },
                    { "kid": "ec-key", "kty": "EC" }
                ]
            })))
            .mount(&mock_server)
            .await;

        mock_server
    }

    #[tokio::test]
    async fn test_new_loads_rsa_keys_only() {
        let server = mock_issuer().await;
        let client = JwksClient::new(&format!("{}/", server.uri())).await.unwrap();
        assert_eq!(client.key_count().await, 1);
    }

    #[tokio::test]
    async fn test_new_fails_when_discovery_missing() {
        let server = MockServer::start().await;
        let result = JwksClient::new(&server.uri()).await;
        assert!(matches!(result, Err(AuthError::JwksFetchError(_))));
    }

    #[tokio::test]
    async fn test_garbage_token_is_rejected() {
        let server = mock_issuer().await;
        let client = JwksClient::new(&server.uri()).await.unwrap();
        let result = client.validate_token("not-a-jwt").await;
        assert!(matches!(result, Err(AuthError::InvalidToken(_))));
    }

    #[tokio::test]
    async fn test_unknown_kid_is_rejected_after_refresh() {
        let server = mock_issuer().await;
        let client = JwksClient::new(&server.uri()).await.unwrap();

        let header = Header {
            kid: Some("rotated-away".to_string()),
            ..Header::default()
        };
        let token = encode(
            &header,
            &json!({ "sub": "u1", "exp": 4_000_000_000u64 }),
            &EncodingKey::from_secret(b"irrelevant"),
        )
        .unwrap();

        let result = client.validate_token(&token).await;
        assert!(matches!(result, Err(AuthError::KeyNotFound(kid)) if kid == "rotated-away"));
    }
}
