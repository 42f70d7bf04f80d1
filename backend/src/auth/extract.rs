use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::Utc;

use backoffice_common::Capability;

use crate::error::ApiError;
use crate::models::user::User;
use crate::AppState;

/// The authenticated caller's identity record.
///
/// Rejects with 401 before touching the store when the token is missing or
/// invalid. On success the user row is created on first sight and its
/// `last_sign_in_at` is moved forward if the token carries a newer sign-in.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_user = state.verifier.authenticate(&parts.headers).await?;
        let user = state.resolve_user(&auth_user, Utc::now())?;
        Ok(CurrentUser(user))
    }
}

/// Fail with 403 unless the user's role grants `capability`.
pub fn require(user: &User, capability: Capability) -> Result<(), ApiError> {
    if user.role.can(capability) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "role '{}' lacks capability {:?}",
            user.role, capability
        )))
    }
}
