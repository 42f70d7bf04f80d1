//! Configuration for the back-office backend.

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally reachable base URL, used to build public blob URLs.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
        }
    }
}

/// How bearer tokens are verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// RS256 tokens from an OIDC issuer, keys fetched from its JWKS endpoint.
    #[default]
    Oidc,
    /// HS256 tokens signed with `auth.shared_secret`.
    SharedSecret,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    /// OIDC issuer URL (required in `oidc` mode).
    #[serde(default)]
    pub issuer: Option<String>,
    /// HMAC secret (required in `shared_secret` mode).
    #[serde(default)]
    pub shared_secret: Option<String>,
    /// Emails that are created with the admin role on first sign-in.
    #[serde(default)]
    pub bootstrap_admins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one sub-directory per bucket.
    #[serde(default = "default_storage_root")]
    pub root: String,
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            max_document_bytes: default_max_document_bytes(),
        }
    }
}

/// Work-hours accrual policy.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    /// Cadence clients are asked to heartbeat at.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    /// Gaps at or above this are not accrued.
    #[serde(default = "default_max_heartbeat_gap")]
    pub max_heartbeat_gap_secs: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval(),
            max_heartbeat_gap_secs: default_max_heartbeat_gap(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    /// A connected user counts as online only if active within this window.
    #[serde(default = "default_liveness_window")]
    pub liveness_window_secs: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            liveness_window_secs: default_liveness_window(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    /// Comma-separated allowed origins, or `*`.
    #[serde(default = "default_cors_origins")]
    pub origins: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: default_cors_origins(),
        }
    }
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_database_url() -> String {
    "sqlite:./data/backoffice.db".to_string()
}
fn default_storage_root() -> String {
    "./data/storage".to_string()
}
fn default_max_document_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_heartbeat_interval() -> u64 {
    60
}
fn default_max_heartbeat_gap() -> u64 {
    300
}
fn default_liveness_window() -> u64 {
    120
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_cors_origins() -> String {
    "*".to_string()
}

/// Upper bound for every configured time window: one day.
pub const MAX_WINDOW_SECS: u64 = 24 * 60 * 60;

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (BACKOFFICE__SECTION__KEY format)
    /// 2. config.toml file (if present)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("BACKOFFICE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("auth.bootstrap_admins")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field requirements serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.auth.mode {
            AuthMode::Oidc if self.auth.issuer.is_none() => {
                return Err(ConfigError::Message(
                    "auth.issuer is required when auth.mode = \"oidc\"".to_string(),
                ))
            }
            AuthMode::SharedSecret if self.auth.shared_secret.is_none() => {
                return Err(ConfigError::Message(
                    "auth.shared_secret is required when auth.mode = \"shared_secret\"".to_string(),
                ))
            }
            _ => {}
        }

        let windows = [
            ("tracking.heartbeat_interval_secs", self.tracking.heartbeat_interval_secs),
            ("tracking.max_heartbeat_gap_secs", self.tracking.max_heartbeat_gap_secs),
            ("presence.liveness_window_secs", self.presence.liveness_window_secs),
        ];
        for (key, secs) in windows {
            if secs == 0 || secs > MAX_WINDOW_SECS {
                return Err(ConfigError::Message(format!(
                    "{} must be between 1 and {} seconds, got {}",
                    key, MAX_WINDOW_SECS, secs
                )));
            }
        }
        Ok(())
    }

    /// Whether an email is listed in `auth.bootstrap_admins` (case-insensitive).
    pub fn is_bootstrap_admin(&self, email: Option<&str>) -> bool {
        let Some(email) = email else {
            return false;
        };
        self.auth
            .bootstrap_admins
            .iter()
            .any(|admin| admin.eq_ignore_ascii_case(email))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from_toml(toml: &str) -> Config {
        ConfigLoader::builder()
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = config_from_toml("");
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.tracking.heartbeat_interval_secs, 60);
        assert_eq!(config.tracking.max_heartbeat_gap_secs, 300);
        assert_eq!(config.presence.liveness_window_secs, 120);
        assert_eq!(config.auth.mode, AuthMode::Oidc);
        assert_eq!(config.cors.origins, "*");
    }

    #[test]
    fn test_oidc_mode_requires_issuer() {
        let config = config_from_toml("");
        assert!(config.validate().is_err());

        let config = config_from_toml("[auth]\nissuer = \"https://id.example.com\"\n");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_shared_secret_mode_requires_secret() {
        let config = config_from_toml("[auth]\nmode = \"shared_secret\"\n");
        assert!(config.validate().is_err());

        let config = config_from_toml("[auth]\nmode = \"shared_secret\"\nshared_secret = \"s3cret\"\n");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tracking_overrides() {
        let config = config_from_toml("[tracking]\nmax_heartbeat_gap_secs = 600\n");
        assert_eq!(config.tracking.max_heartbeat_gap_secs, 600);
        assert_eq!(config.tracking.heartbeat_interval_secs, 60);
    }

    #[test]
    fn test_time_windows_are_bounded() {
        let base = "[auth]\nmode = \"shared_secret\"\nshared_secret = \"s3cret\"\n";

        let config = config_from_toml(&format!("{}[tracking]\nmax_heartbeat_gap_secs = 0\n", base));
        assert!(config.validate().is_err());

        let config = config_from_toml(&format!(
            "{}[tracking]\nmax_heartbeat_gap_secs = 10000000000000000\n",
            base
        ));
        assert!(config.validate().is_err());

        let config = config_from_toml(&format!("{}[presence]\nliveness_window_secs = 86401\n", base));
        assert!(config.validate().is_err());

        let config = config_from_toml(&format!("{}[presence]\nliveness_window_secs = 86400\n", base));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bootstrap_admin_is_case_insensitive() {
        let config = config_from_toml("[auth]\nbootstrap_admins = [\"Boss@Example.com\"]\n");
        assert!(config.is_bootstrap_admin(Some("boss@example.com")));
        assert!(!config.is_bootstrap_admin(Some("intern@example.com")));
        assert!(!config.is_bootstrap_admin(None));
    }
}
