//! Local filesystem blob storage with public URLs.
//!
//! Objects live at `<root>/<bucket>/<path>` and are served read-only under
//! `/storage/<bucket>/<path>`.

use std::path::{Component, Path, PathBuf};

use tokio::io::AsyncWriteExt;

pub const AVATARS_BUCKET: &str = "avatars";
pub const DOCUMENTS_BUCKET: &str = "documents";

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("Invalid blob path: {0}")]
    InvalidPath(String),
    #[error("Blob already exists: {0}")]
    AlreadyExists(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct BlobStore {
    root: PathBuf,
    public_base: String,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base: &str) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a new object. Existing objects are never overwritten.
    pub async fn put(&self, bucket: &str, path: &str, bytes: &[u8]) -> Result<String, BlobError> {
        let target = self.resolve(bucket, path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    BlobError::AlreadyExists(format!("{}/{}", bucket, path))
                }
                _ => BlobError::Io(e),
            })?;
        file.write_all(bytes).await?;
        file.flush().await?;

        tracing::debug!("Stored blob {}/{} ({} bytes)", bucket, path, bytes.len());
        Ok(self.public_url(bucket, path))
    }

    /// Delete an object. Returns false if it did not exist.
    pub async fn remove(&self, bucket: &str, path: &str) -> Result<bool, BlobError> {
        let target = self.resolve(bucket, path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/{}/{}", self.public_base, bucket, path)
    }

    fn resolve(&self, bucket: &str, path: &str) -> Result<PathBuf, BlobError> {
        for part in [bucket, path] {
            let relative = Path::new(part);
            let plain = !part.is_empty()
                && relative
                    .components()
                    .all(|c| matches!(c, Component::Normal(_)));
            if !plain {
                return Err(BlobError::InvalidPath(part.to_string()));
            }
        }
        Ok(self.root.join(bucket).join(path))
    }
}

/// Keep only characters that are safe in a storage path.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}
