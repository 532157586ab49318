use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No file uploaded")]
    EmptyPayload,
    #[error("File type not allowed")]
    UnsupportedFormat,
    #[error("File too large")]
    PayloadTooLarge,
    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResponseError for StoreError {
    fn status_code(&self) -> StatusCode {
        match self {
            StoreError::EmptyPayload | StoreError::UnsupportedFormat => StatusCode::BAD_REQUEST,
            StoreError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            StoreError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

/// Handle to a stored upload. The input file is a scoped resource:
/// dropping the handle deletes it, so every exit path (success, decode
/// failure, stage failure, timeout) releases the temp file.
#[derive(Debug)]
pub struct InputHandle {
    path: PathBuf,
}

impl InputHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InputHandle {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("Failed to remove upload {}: {}", self.path.display(), e);
        }
    }
}

/// A (path, unique id) pair in the results namespace. Ids are UUID v4,
/// so concurrent requests never collide on an output path.
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    id: String,
    path: PathBuf,
}

impl StoredArtifact {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reference the client can resolve through the static results route.
    pub fn public_path(&self) -> String {
        format!("/results/{}.png", self.id)
    }
}

/// Ingestion and storage manager backed by two local filesystem
/// namespaces: one for raw uploads, one for derived artifacts.
#[derive(Clone)]
pub struct LocalStore {
    upload_dir: PathBuf,
    result_dir: PathBuf,
    max_payload_bytes: usize,
}

impl LocalStore {
    pub fn new(
        upload_dir: impl Into<PathBuf>,
        result_dir: impl Into<PathBuf>,
        max_payload_bytes: usize,
    ) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            result_dir: result_dir.into(),
            max_payload_bytes,
        }
    }

    /// Create both namespaces if absent. Idempotent, called at startup.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.upload_dir)?;
        fs::create_dir_all(&self.result_dir)?;
        Ok(())
    }

    pub fn calculate_content_hash(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    fn allowed_extension(original_name: &str) -> Result<String, StoreError> {
        let ext = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or(StoreError::UnsupportedFormat)?;
        if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            Ok(ext)
        } else {
            Err(StoreError::UnsupportedFormat)
        }
    }

    /// Persist a raw upload to the input namespace. The stored filename
    /// is derived from the content hash, so the original name never
    /// reaches the filesystem beyond its extension.
    pub fn receive(&self, data: &[u8], original_name: &str) -> Result<InputHandle, StoreError> {
        if data.is_empty() {
            return Err(StoreError::EmptyPayload);
        }
        if data.len() > self.max_payload_bytes {
            return Err(StoreError::PayloadTooLarge);
        }
        let ext = Self::allowed_extension(original_name)?;
        // Per-request suffix: identical payloads uploaded concurrently
        // must not share a path, since the handle deletes it on drop.
        let filename = format!(
            "{}-{}.{}",
            Self::calculate_content_hash(data),
            Uuid::new_v4().simple(),
            ext
        );
        let path = self.upload_dir.join(filename);
        fs::write(&path, data)?;
        Ok(InputHandle { path })
    }

    /// Allocate a unique output path for the derived artifact.
    pub fn allocate_output(&self) -> StoredArtifact {
        let id = Uuid::new_v4().simple().to_string();
        let path = self.result_dir.join(format!("{id}.png"));
        StoredArtifact { id, path }
    }
}
