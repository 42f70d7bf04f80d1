use std::sync::Arc;

use tokio::net::TcpListener;

use backoffice_backend::auth::{JwksClient, SharedSecretVerifier, TokenVerifier};
use backoffice_backend::config::{AuthMode, Config};
use backoffice_backend::{app, logging, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    logging::init(&config.logging.level);

    tracing::info!("Starting back-office service");

    let verifier: Arc<dyn TokenVerifier> = match config.auth.mode {
        AuthMode::Oidc => {
            let issuer = config.auth.issuer.as_deref().unwrap_or_default();
            tracing::info!("Verifying tokens against OIDC issuer {}", issuer);
            Arc::new(JwksClient::new(issuer).await?)
        }
        AuthMode::SharedSecret => {
            tracing::info!("Verifying tokens with the configured shared secret");
            Arc::new(SharedSecretVerifier::new(
                config.auth.shared_secret.as_deref().unwrap_or_default(),
            ))
        }
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, verifier)?);
    let app = app(state);

    tracing::info!("Listening on {}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
