use chrono::{DateTime, Utc};
use serde::Serialize;

/// Metadata of an uploaded client document. The bytes live in the blob store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub file_name: String,
    /// Path inside the `documents` bucket.
    pub file_path: String,
    pub file_url: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub company: Option<String>,
    /// User id of the uploader.
    pub uploaded_by: Option<String>,
}

/// Submitter details accompanying an upload.
#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    pub file_name: String,
    pub file_path: String,
    pub file_url: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub company: Option<String>,
    pub uploaded_by: Option<String>,
}
