//! Ebook record service: validation and the ordering of image store and
//! record store calls for each operation.

use std::sync::Arc;

use shelf_media::{ImageStore, ImageUpload, MediaError, Removal};
use thiserror::Error;

use super::models::{
    CreateEbook, EbookDeleted, EbookId, EbookPatch, EbookRecord, EbookUpdated, ImageCleanup,
    NewEbook,
};
use super::store::{EbookStore, StoreError};
use crate::utils::non_blank;

/// Image store namespace for cover uploads.
pub const COVER_NAMESPACE: &str = "ebook_covers";

#[derive(Debug, Error)]
pub enum EbookError {
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("ebook '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Media(#[from] MediaError),
}

impl EbookError {
    fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Store or network failure rather than a problem with the request
    pub fn is_server_error(&self) -> bool {
        matches!(self, EbookError::Store(_) | EbookError::Media(_))
    }
}

#[derive(Clone)]
pub struct EbookService {
    records: Arc<dyn EbookStore>,
    images: Arc<dyn ImageStore>,
}

impl EbookService {
    pub fn new(records: Arc<dyn EbookStore>, images: Arc<dyn ImageStore>) -> Self {
        Self { records, images }
    }

    pub async fn list(&self) -> Result<Vec<EbookRecord>, EbookError> {
        Ok(self.records.find_all().await?)
    }

    pub async fn get(&self, id: &str) -> Result<EbookRecord, EbookError> {
        let id = parse_id(id)?;
        self.records
            .find_by_id(&id)
            .await?
            .ok_or_else(|| EbookError::NotFound(id.to_string()))
    }

    /// Validate, upload the cover if one was sent, then insert.
    ///
    /// A cover uploaded for an insert that then fails is released again.
    pub async fn create(&self, input: CreateEbook) -> Result<EbookRecord, EbookError> {
        let title = non_blank(input.title)
            .ok_or_else(|| EbookError::validation("title", "title is required"))?;
        let book_link = non_blank(input.book_link)
            .ok_or_else(|| EbookError::validation("bookLink", "bookLink is required"))?;
        let image = checked_image(input.image)?;

        let draft = match image {
            Some(image) => {
                let cover = self.images.upload(image, COVER_NAMESPACE).await?;
                tracing::debug!(image_ref = %cover.reference, "cover uploaded");
                NewEbook::with_cover(title, book_link, cover)
            }
            None => NewEbook::with_placeholder(title, book_link),
        };
        let uploaded = draft.image_ref.clone();

        match self.records.insert(draft).await {
            Ok(record) => {
                tracing::info!(
                    id = %record.id,
                    has_cover = record.image_ref.is_some(),
                    "ebook created"
                );
                Ok(record)
            }
            Err(err) => {
                if let Some(reference) = uploaded {
                    self.discard_upload(&reference, &err).await;
                }
                Err(err.into())
            }
        }
    }

    /// Apply a partial update.
    ///
    /// A new cover is uploaded before the record is written and the old cover
    /// is released only after the write succeeded, so the stored record never
    /// points at a deleted image.
    pub async fn update(&self, id: &str, patch: EbookPatch) -> Result<EbookUpdated, EbookError> {
        let id = parse_id(id)?;
        let title = non_blank(patch.title);
        let book_link = non_blank(patch.book_link);
        let image = checked_image(patch.image)?;

        let current = self
            .records
            .find_by_id(&id)
            .await?
            .ok_or_else(|| EbookError::NotFound(id.to_string()))?;

        let mut next = current.clone();
        if let Some(title) = title {
            next.title = title;
        }
        if let Some(book_link) = book_link {
            next.book_link = book_link;
        }

        let mut uploaded = None;
        if let Some(image) = image {
            let cover = self.images.upload(image, COVER_NAMESPACE).await?;
            next.image_url = cover.url;
            next.image_ref = Some(cover.reference.clone());
            uploaded = Some(cover.reference);
        }

        let saved = match self.records.save(next).await {
            Ok(Some(saved)) => saved,
            Ok(None) => {
                // Deleted between the read and the write
                if let Some(reference) = &uploaded {
                    self.release_image(reference).await;
                }
                return Err(EbookError::NotFound(id.to_string()));
            }
            Err(err) => {
                if let Some(reference) = &uploaded {
                    self.discard_upload(reference, &err).await;
                }
                return Err(err.into());
            }
        };

        let previous_cover = match (&uploaded, &current.image_ref) {
            (Some(_), Some(old)) => self.release_image(old).await,
            _ => ImageCleanup::NotNeeded,
        };

        tracing::info!(id = %saved.id, cover_replaced = uploaded.is_some(), "ebook updated");
        Ok(EbookUpdated {
            record: saved,
            previous_cover,
        })
    }

    /// Remove the record, then release its cover.
    ///
    /// A failed release does not bring the record back; it is reported in the outcome.
    pub async fn delete(&self, id: &str) -> Result<EbookDeleted, EbookError> {
        let id = parse_id(id)?;
        let record = self
            .records
            .delete_by_id(&id)
            .await?
            .ok_or_else(|| EbookError::NotFound(id.to_string()))?;

        let cover = match &record.image_ref {
            Some(reference) => self.release_image(reference).await,
            None => ImageCleanup::NotNeeded,
        };

        tracing::info!(id = %record.id, cover = ?cover, "ebook deleted");
        Ok(EbookDeleted { record, cover })
    }

    /// Release a cover uploaded for a write that failed. When the write may
    /// still have been committed the cover is kept, since the record could
    /// point at it.
    async fn discard_upload(&self, reference: &str, err: &StoreError) {
        if err.outcome_unknown() {
            tracing::warn!(
                image_ref = %reference,
                error = %err,
                "record write outcome unknown; keeping uploaded cover"
            );
            return;
        }
        self.release_image(reference).await;
    }

    async fn release_image(&self, reference: &str) -> ImageCleanup {
        match self.images.delete(reference).await {
            Ok(Removal::Deleted) => {
                tracing::debug!(image_ref = %reference, "cover released");
                ImageCleanup::Deleted
            }
            Ok(Removal::NotFound) => {
                tracing::info!(image_ref = %reference, "cover was already gone");
                ImageCleanup::AlreadyGone
            }
            Err(err) => {
                tracing::warn!(
                    image_ref = %reference,
                    backend = self.images.backend(),
                    error = %err,
                    "failed to release cover image"
                );
                ImageCleanup::Failed(err.to_string())
            }
        }
    }
}

fn parse_id(raw: &str) -> Result<EbookId, EbookError> {
    raw.parse()
        .map_err(|_| EbookError::validation("id", format!("'{raw}' is not a valid ebook id")))
}

/// Drop empty uploads and reject anything that is not an image.
fn checked_image(image: Option<ImageUpload>) -> Result<Option<ImageUpload>, EbookError> {
    match image {
        Some(image) if image.is_empty() => Ok(None),
        Some(image) if !image.is_image() => Err(EbookError::validation(
            "image",
            format!("unsupported image type '{}'", image.content_type),
        )),
        other => Ok(other),
    }
}
