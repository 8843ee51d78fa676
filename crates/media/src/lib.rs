//! Image store abstraction.
//!
//! An image store keeps binary images under a logical namespace and hands back
//! a public URL plus an opaque reference that can later be used to delete the
//! object.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use shelf_kernel::settings::{StorageBackend, StorageSettings};
use thiserror::Error;

pub mod memory;
pub mod s3;

pub use memory::MemoryImageStore;
pub use s3::S3ImageStore;

/// Binary image received from a client.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Bytes,
    pub content_type: String,
    pub file_name: Option<String>,
}

impl ImageUpload {
    pub fn new(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the declared content type is an image type.
    pub fn is_image(&self) -> bool {
        match self.content_type.split_once('/') {
            Some((kind, subtype)) => {
                kind.trim().eq_ignore_ascii_case("image") && !subtype.trim().is_empty()
            }
            None => false,
        }
    }

    /// File extension matching the content type, used when naming stored objects.
    pub fn extension(&self) -> &'static str {
        let essence = self
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/avif" => "avif",
            "image/svg+xml" => "svg",
            "image/bmp" => "bmp",
            "image/tiff" => "tiff",
            _ => "bin",
        }
    }
}

/// Location of an uploaded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    /// Public URL clients can fetch the image from
    pub url: String,
    /// Opaque reference accepted by [`ImageStore::delete`]
    pub reference: String,
}

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Deleted,
    /// The store had no object under the reference
    NotFound,
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("image store rejected the request: {0}")]
    Rejected(String),

    #[error("image store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Short backend name used in logs
    fn backend(&self) -> &'static str;

    async fn upload(&self, image: ImageUpload, namespace: &str) -> Result<StoredImage, MediaError>;

    async fn delete(&self, reference: &str) -> Result<Removal, MediaError>;
}

/// Build the image store selected by `storage.backend`.
pub async fn connect(settings: &StorageSettings) -> anyhow::Result<Arc<dyn ImageStore>> {
    let store: Arc<dyn ImageStore> = match settings.backend {
        StorageBackend::S3 => Arc::new(S3ImageStore::new(settings).await?),
        StorageBackend::Memory => {
            tracing::warn!(
                target: "shelf-media",
                "using in-memory image store; uploaded covers are lost on restart"
            );
            Arc::new(MemoryImageStore::new())
        }
    };

    tracing::info!(target: "shelf-media", backend = store.backend(), "image store ready");
    Ok(store)
}
