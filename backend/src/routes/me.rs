//! Self-service routes for the signed-in user.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;

use backoffice_common::{Capability, Dashboard};

use crate::auth::CurrentUser;
use crate::blob::{sanitize_file_name, AVATARS_BUCKET};
use crate::error::{ApiError, Result};
use crate::models::user::{ProfileUpdate, User, UserUpdate, UserWithHours};
use crate::AppState;

use super::multipart::read_form;

pub const MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: UserWithHours,
    pub capabilities: &'static [Capability],
    pub dashboard: Dashboard,
}

/// GET /api/me
async fn me(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<MeResponse>> {
    let with_hours = state.store.user_with_hours(&user.id)?;
    Ok(Json(MeResponse {
        capabilities: user.role.capabilities(),
        dashboard: user.role.dashboard(),
        user: with_hours,
    }))
}

/// PATCH /api/me/profile
async fn update_profile(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<User>> {
    let update = UserUpdate {
        first_name: update.first_name,
        last_name: update.last_name,
        role: None,
    };
    let updated = state.store.update_user(&user.id, &update)?;
    Ok(Json(updated))
}

#[derive(Debug, Serialize)]
struct AvatarResponse {
    avatar_url: String,
}

/// Extension for a stored avatar: from the file name, else the MIME subtype.
fn avatar_extension(file_name: &str, content_type: &str) -> String {
    let from_name = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()));
    let ext = match from_name {
        Some(ext) => ext,
        None => content_type
            .strip_prefix("image/")
            .and_then(|sub| sub.split(['+', ';']).next())
            .filter(|sub| !sub.is_empty())
            .unwrap_or("img"),
    };
    ext.to_ascii_lowercase()
}

/// POST /api/me/avatar
async fn upload_avatar(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> Result<Json<AvatarResponse>> {
    let form = read_form(multipart, MAX_AVATAR_BYTES).await?;
    let file = form
        .file
        .ok_or_else(|| ApiError::InvalidRequest("file is required".to_string()))?;

    let content_type = file.content_type.as_deref().unwrap_or_default();
    if !content_type.starts_with("image/") {
        return Err(ApiError::InvalidRequest(format!(
            "avatar must be an image, got '{}'",
            content_type
        )));
    }

    let path = sanitize_file_name(&format!(
        "{}-{}.{}",
        user.id,
        Utc::now().timestamp_millis(),
        avatar_extension(&file.file_name, content_type)
    ));
    let avatar_url = state.blobs.put(AVATARS_BUCKET, &path, &file.bytes).await?;
    state.store.set_avatar_url(&user.id, &avatar_url)?;

    tracing::info!("User {} uploaded avatar {}", user.id, path);
    Ok(Json(AvatarResponse { avatar_url }))
}

pub fn router(state: Arc<AppState>) -> Router {
    let avatar = Router::new()
        .route("/api/me/avatar", post(upload_avatar))
        // Headroom for the multipart envelope; the file itself is checked exactly
        .layer(DefaultBodyLimit::max(MAX_AVATAR_BYTES + 64 * 1024));

    Router::new()
        .route("/api/me", get(me))
        .route("/api/me/profile", patch(update_profile))
        .merge(avatar)
        .with_state(state)
}
