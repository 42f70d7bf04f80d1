pub mod auth;
pub mod blob;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod presence;
pub mod routes;
pub mod store;
pub mod test_util;
pub mod tracking;

pub use auth::{AuthUser, TokenVerifier};
pub use config::Config;
pub use error::ApiError;
pub use store::Store;

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::{middleware, Router};
use chrono::{DateTime, Duration, Utc};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use backoffice_common::Role;

use crate::blob::BlobStore;
use crate::config::MAX_WINDOW_SECS;
use crate::models::user::User;
use crate::presence::PresenceRegistry;
use crate::store::StoreError;
use crate::tracking::{AccrualPolicy, ActivityTracker};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub verifier: Arc<dyn TokenVerifier>,
    pub store: Arc<Store>,
    /// Avatar and document storage.
    pub blobs: BlobStore,
    pub tracker: ActivityTracker,
    /// Connected presence sessions.
    pub presence: PresenceRegistry,
}

impl AppState {
    pub fn new(config: Config, verifier: Arc<dyn TokenVerifier>) -> Result<Self, StoreError> {
        let store = Arc::new(Store::new(&config.database.url)?);
        let blobs = BlobStore::new(&config.storage.root, &config.server.public_url);
        let tracker = ActivityTracker::new(store.clone(), AccrualPolicy::from(&config.tracking));
        let presence = PresenceRegistry::new(Duration::seconds(
            config.presence.liveness_window_secs.min(MAX_WINDOW_SECS) as i64,
        ));

        Ok(Self {
            config,
            verifier,
            store,
            blobs,
            tracker,
            presence,
        })
    }

    /// Identity record for a verified token, created on first sight.
    pub fn resolve_user(&self, auth: &AuthUser, now: DateTime<Utc>) -> Result<User, StoreError> {
        let role_if_new = if self.config.is_bootstrap_admin(auth.email.as_deref()) {
            Role::Admin
        } else {
            Role::default()
        };
        self.store.upsert_identity(auth, role_if_new, now)
    }
}

fn cors_layer(origins: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.trim() == "*" {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Build the full application router.
pub fn app(state: Arc<AppState>) -> Router {
    let storage = ServeDir::new(state.blobs.root());

    Router::new()
        .merge(routes::health::router(state.clone()))
        .merge(routes::me::router(state.clone()))
        .merge(routes::activity::router(state.clone()))
        .merge(routes::tasks::router(state.clone()))
        .merge(routes::documents::router(state.clone()))
        .merge(presence::ws::router(state.clone()))
        .nest("/admin", routes::admin::router(state.clone()))
        .nest_service("/storage", storage)
        .layer(middleware::from_fn(logging::request_logger))
        .layer(cors_layer(&state.config.cors.origins))
        .layer(TraceLayer::new_for_http())
}
