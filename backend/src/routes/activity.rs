//! Activity tracking routes for the signed-in user.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use backoffice_common::{Capability, HoursSummary, TimeFilter};

use crate::auth::{require, CurrentUser};
use crate::error::Result;
use crate::tracking::HeartbeatReport;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct HoursQuery {
    #[serde(default)]
    pub filter: TimeFilter,
}

/// POST /api/activity/heartbeat
///
/// Always 200 once authenticated; storage failures show up as
/// `success: false` in the body.
async fn heartbeat(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<HeartbeatReport>> {
    require(&user, Capability::TrackPresence)?;
    Ok(Json(state.tracker.record_heartbeat(&user.id, Utc::now())))
}

/// GET /api/activity/hours?filter=today|week|month|all
async fn hours(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<HoursQuery>,
) -> Result<Json<HoursSummary>> {
    require(&user, Capability::ViewOwnHours)?;

    let now = Utc::now();
    let is_online = state
        .presence
        .is_online(&user.id, user.last_active_timestamp, now)
        .await;
    let summary = state.tracker.hours_for(&user.id, query.filter, is_online, now)?;
    Ok(Json(summary))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/activity/heartbeat", post(heartbeat))
        .route("/api/activity/hours", get(hours))
        .with_state(state)
}
