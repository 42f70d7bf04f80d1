//! Admin API routes.
//!
//! Provides:
//! - User management (`/admin/api/users`, `/admin/api/users/:id`)
//! - Hours for every user (`/admin/api/hours`)
//! - Raw work-log rows (`/admin/api/work-logs`)
//! - Staff currently on duty (`/admin/api/presence`)

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};

use backoffice_common::{Capability, HoursSummary, PresenceRecord, Role};

use crate::auth::{require, CurrentUser};
use crate::error::{ApiError, Result};
use crate::models::user::{User, UserUpdate, UserWithHours};
use crate::models::work_log::WorkLogEntry;
use crate::AppState;

use super::activity::HoursQuery;

/// Middleware that requires an authenticated admin user.
///
/// The resolved user is stored as a [`CurrentUser`] request extension.
async fn require_admin(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_user = match state.verifier.authenticate(request.headers()).await {
        Ok(auth_user) => auth_user,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let user = match state.resolve_user(&auth_user, Utc::now()) {
        Ok(user) => user,
        Err(e) => return ApiError::from(e).into_response(),
    };

    if let Err(e) = require(&user, Capability::ManageUsers) {
        tracing::warn!("User {} denied access to {}", user.id, request.uri().path());
        return e.into_response();
    }

    request.extensions_mut().insert(CurrentUser(user));
    next.run(request).await
}

/// GET /admin/api/users
async fn list_users(State(state): State<Arc<AppState>>) -> Result<Json<Vec<UserWithHours>>> {
    Ok(Json(state.store.list_users_with_hours()?))
}

/// PATCH /admin/api/users/:id
async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Path(user_id): Path<String>,
    Json(update): Json<UserUpdate>,
) -> Result<Json<User>> {
    if user_id == admin.id && update.role.is_some_and(|role| role != Role::Admin) {
        return Err(ApiError::InvalidRequest(
            "admins cannot remove their own admin role".to_string(),
        ));
    }
    let user = state.store.update_user(&user_id, &update)?;
    tracing::info!("User {} updated by {}", user_id, admin.id);
    Ok(Json(user))
}

/// DELETE /admin/api/users/:id
async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Path(user_id): Path<String>,
) -> Result<StatusCode> {
    if user_id == admin.id {
        return Err(ApiError::InvalidRequest(
            "admins cannot delete themselves".to_string(),
        ));
    }
    if state.store.delete_user(&user_id, Utc::now())? {
        let sessions = state.presence.untrack_user(&user_id).await;
        tracing::info!(
            "User {} deleted by {} ({} presence sessions closed)",
            user_id,
            admin.id,
            sessions
        );
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("user {}", user_id)))
    }
}

/// GET /admin/api/hours?filter=today|week|month|all
async fn hours(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Query(query): Query<HoursQuery>,
) -> Result<Json<Vec<HoursSummary>>> {
    require(&admin, Capability::ViewAllHours)?;

    let now = Utc::now();
    let users = state.store.list_users_with_hours()?;
    let activity: Vec<(String, Option<DateTime<Utc>>)> = users
        .iter()
        .map(|u| (u.user.id.clone(), u.user.last_active_timestamp))
        .collect();
    let online = state.presence.online_users(&activity, now).await;

    let summaries = users
        .iter()
        .map(|u| {
            let is_online = online.contains(&u.user.id);
            state.tracker.summarize(u, query.filter, is_online, now)
        })
        .collect();
    Ok(Json(summaries))
}

/// GET /admin/api/work-logs
async fn work_logs(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
) -> Result<Json<Vec<WorkLogEntry>>> {
    require(&admin, Capability::ViewAllHours)?;
    Ok(Json(state.store.list_work_logs()?))
}

/// GET /admin/api/presence
///
/// Employees that are connected and were active within the liveness window.
async fn presence(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
) -> Result<Json<Vec<PresenceRecord>>> {
    require(&admin, Capability::ViewAllHours)?;

    let now = Utc::now();
    let last_active: HashMap<String, _> = state
        .store
        .list_users()?
        .into_iter()
        .map(|u| (u.id, u.last_active_timestamp))
        .collect();

    let mut on_duty = Vec::new();
    for member in state.presence.members().await {
        if member.role != Role::Employee {
            continue;
        }
        let activity = last_active.get(&member.id).copied().flatten();
        if state.presence.is_online(&member.id, activity, now).await {
            on_duty.push(member);
        }
    }
    Ok(Json(on_duty))
}

/// Build the admin router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/users", get(list_users))
        .route(
            "/api/users/:id",
            axum::routing::patch(update_user).delete(delete_user),
        )
        .route("/api/hours", get(hours))
        .route("/api/work-logs", get(work_logs))
        .route("/api/presence", get(presence))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .with_state(state)
}
