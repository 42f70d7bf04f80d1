//! Reading `multipart/form-data` uploads.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::Multipart;
use axum::http::StatusCode;

use crate::error::ApiError;

pub(crate) struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// The `file` part of a form plus its text fields.
pub(crate) struct UploadForm {
    pub file: Option<UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    /// Trimmed, non-empty text field.
    pub fn field(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(String::from)
    }

    pub fn required(&self, name: &str) -> Result<String, ApiError> {
        self.field(name)
            .ok_or_else(|| ApiError::InvalidRequest(format!("{} is required", name)))
    }
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::InvalidRequest(e.body_text())
    }
}

/// Collect a form, rejecting files larger than `max_file_bytes`.
pub(crate) async fn read_form(
    mut multipart: Multipart,
    max_file_bytes: usize,
) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm {
        file: None,
        fields: HashMap::new(),
    };

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if name == "file" {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let content_type = field.content_type().map(String::from);
            let bytes = field.bytes().await.map_err(multipart_error)?;
            if bytes.len() > max_file_bytes {
                return Err(ApiError::PayloadTooLarge(format!(
                    "file exceeds {} bytes",
                    max_file_bytes
                )));
            }
            form.file = Some(UploadedFile {
                file_name,
                content_type,
                bytes,
            });
        } else {
            let value = field.text().await.map_err(multipart_error)?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}
