//! Client document uploads.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use chrono::Utc;
use uuid::Uuid;

use backoffice_common::Capability;

use crate::auth::{require, CurrentUser};
use crate::blob::{sanitize_file_name, DOCUMENTS_BUCKET};
use crate::error::{ApiError, Result};
use crate::models::document::{Document, NewDocument};
use crate::AppState;

use super::multipart::read_form;

/// POST /api/documents
async fn upload_document(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Document>)> {
    require(&user, Capability::UploadDocuments)?;

    let form = read_form(multipart, state.config.storage.max_document_bytes).await?;
    let first_name = form.required("first_name")?;
    let last_name = form.required("last_name")?;
    let email = form.required("email")?;
    if !email.contains('@') {
        return Err(ApiError::InvalidRequest(format!("invalid email '{}'", email)));
    }
    let company = form.field("company");

    let file = form
        .file
        .ok_or_else(|| ApiError::InvalidRequest("file is required".to_string()))?;
    if file.bytes.is_empty() {
        return Err(ApiError::InvalidRequest("file is empty".to_string()));
    }

    let id = Uuid::new_v4().simple().to_string();
    let file_path = format!(
        "{}-{}-{}",
        Utc::now().timestamp_millis(),
        &id[..8],
        sanitize_file_name(&file.file_name)
    );
    let file_url = state.blobs.put(DOCUMENTS_BUCKET, &file_path, &file.bytes).await?;

    let document = state.store.create_document(
        NewDocument {
            file_name: file.file_name,
            file_path,
            file_url,
            first_name,
            last_name,
            email,
            company,
            uploaded_by: Some(user.id.clone()),
        },
        Utc::now(),
    )?;

    tracing::info!(
        "Document {} ({} bytes) uploaded by {}",
        document.id,
        file.bytes.len(),
        user.id
    );
    Ok((StatusCode::CREATED, Json(document)))
}

/// GET /api/documents
async fn list_documents(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Document>>> {
    require(&user, Capability::ManageDocuments)?;
    Ok(Json(state.store.list_documents()?))
}

/// DELETE /api/documents/:id
///
/// The blob goes first. A blob that is already gone does not block removing
/// the record.
async fn delete_document(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(document_id): Path<String>,
) -> Result<StatusCode> {
    require(&user, Capability::ManageDocuments)?;

    let document = state.store.get_document(&document_id)?;
    match state.blobs.remove(DOCUMENTS_BUCKET, &document.file_path).await {
        Ok(true) => {}
        Ok(false) => tracing::warn!(
            "Blob {} for document {} was already missing",
            document.file_path,
            document.id
        ),
        Err(e) => tracing::error!(
            "Failed to remove blob {} for document {}: {}",
            document.file_path,
            document.id,
            e
        ),
    }

    state.store.delete_document(&document.id)?;
    tracing::info!("Document {} deleted by {}", document.id, user.id);
    Ok(StatusCode::NO_CONTENT)
}

pub fn router(state: Arc<AppState>) -> Router {
    let limit = state.config.storage.max_document_bytes + 64 * 1024;

    Router::new()
        .route(
            "/api/documents",
            get(list_documents)
                .post(upload_document)
                .layer(DefaultBodyLimit::max(limit)),
        )
        .route("/api/documents/:id", delete(delete_document))
        .with_state(state)
}
