//! Process-local image store used by tests and local runs.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{ImageStore, ImageUpload, MediaError, Removal, StoredImage};

const URL_SCHEME: &str = "memory://";

#[derive(Debug, Clone)]
struct StoredObject {
    content_type: String,
    bytes: Bytes,
}

#[derive(Debug, Default)]
pub struct MemoryImageStore {
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, reference: &str) -> bool {
        self.objects.read().await.contains_key(reference)
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Content type and bytes stored under `reference`
    pub async fn get(&self, reference: &str) -> Option<(String, Bytes)> {
        self.objects
            .read()
            .await
            .get(reference)
            .map(|object| (object.content_type.clone(), object.bytes.clone()))
    }

    pub fn url_for(reference: &str) -> String {
        format!("{URL_SCHEME}{reference}")
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn upload(&self, image: ImageUpload, namespace: &str) -> Result<StoredImage, MediaError> {
        let reference = format!("{}/{}.{}", namespace, Uuid::new_v4(), image.extension());

        self.objects.write().await.insert(
            reference.clone(),
            StoredObject {
                content_type: image.content_type,
                bytes: image.bytes,
            },
        );

        Ok(StoredImage {
            url: Self::url_for(&reference),
            reference,
        })
    }

    async fn delete(&self, reference: &str) -> Result<Removal, MediaError> {
        match self.objects.write().await.remove(reference) {
            Some(_) => Ok(Removal::Deleted),
            None => Ok(Removal::NotFound),
        }
    }
}
