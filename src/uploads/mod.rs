//! Attachment storage boundary.
//!
//! Tasks reference attachments only through an opaque `fileUrl`; the bytes
//! themselves move out-of-band over a plain HTTP request/response, never
//! through the realtime protocol. The size ceiling is enforced by the caller
//! before any bytes move — the client helper refuses before opening a
//! connection, the server endpoint refuses from `Content-Length` before
//! reading the body.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

/// Fixed attachment size ceiling (5 MiB) unless overridden in config.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("attachment of {size} bytes exceeds the {limit}-byte ceiling")]
    TooLarge { size: u64, limit: u64 },
    #[error("attachment storage failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("upload request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("attachment storage rejected the upload: HTTP {status}")]
    Rejected { status: u16 },
}

/// Reject a payload above the ceiling. Call before moving any bytes.
pub fn check_size(size: u64, limit: u64) -> Result<(), UploadError> {
    if size > limit {
        return Err(UploadError::TooLarge { size, limit });
    }
    Ok(())
}

/// `store(fileBytes) -> URL` — the only operation the board needs from an
/// attachment provider.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn store(&self, file_name: &str, bytes: &[u8]) -> Result<String, UploadError>;
}

/// Stores attachments under `{data_dir}/uploads` and hands back
/// `/uploads/<unique-name>` URLs.
pub struct LocalAttachmentStore {
    root: PathBuf,
}

impl LocalAttachmentStore {
    pub fn new(data_dir: &std::path::Path) -> Self {
        Self {
            root: data_dir.join("uploads"),
        }
    }
}

#[async_trait]
impl AttachmentStore for LocalAttachmentStore {
    async fn store(&self, file_name: &str, bytes: &[u8]) -> Result<String, UploadError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let unique = format!("{}-{}", Uuid::new_v4(), sanitize_file_name(file_name));
        let path = self.root.join(&unique);
        tokio::fs::write(&path, bytes).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "attachment written");
        Ok(format!("/uploads/{unique}"))
    }
}

/// Upload `bytes` to a running board server and return the `fileUrl`.
///
/// The ceiling check runs first: an oversized payload fails here without any
/// network call being made.
pub async fn upload_attachment(
    base_url: &str,
    file_name: &str,
    bytes: Vec<u8>,
    limit: u64,
) -> Result<String, UploadError> {
    check_size(bytes.len() as u64, limit)?;

    let response = reqwest::Client::new()
        .post(format!("{base_url}/upload"))
        .header("X-File-Name", file_name)
        .body(bytes)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(UploadError::Rejected {
            status: response.status().as_u16(),
        });
    }
    let body: serde_json::Value = response.json().await?;
    Ok(body
        .get("fileUrl")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string())
}

/// Keep file names path-safe: alphanumerics, dot, dash, underscore.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "attachment.bin".to_string()
    } else {
        cleaned
    }
}
