use axum::{routing::get, Json, Router};
use axum::response::{IntoResponse, Response};
use axum::http::{header, StatusCode};
use axum::extract::State;
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let version = env!("CARGO_PKG_VERSION");
    let sessions = state.presence.session_count().await;
    let members = state.presence.members().await.len();
    let body = format!(
        "# HELP backoffice_up Whether the service is up\n\
         # TYPE backoffice_up gauge\n\
         backoffice_up 1\n\
         # HELP backoffice_info Service information\n\
         # TYPE backoffice_info gauge\n\
         backoffice_info{{version=\"{}\"}} 1\n\
         # HELP backoffice_presence_sessions Open presence connections\n\
         # TYPE backoffice_presence_sessions gauge\n\
         backoffice_presence_sessions {}\n\
         # HELP backoffice_presence_users Distinct users on the presence channel\n\
         # TYPE backoffice_presence_users gauge\n\
         backoffice_presence_users {}\n",
        version, sessions, members
    );
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}
