use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shelf_media::{ImageUpload, StoredImage};
use uuid::Uuid;

/// Cover shown for ebooks that were saved without an image.
pub const PLACEHOLDER_COVER_URL: &str = "https://placehold.co/300x450?text=No+Cover";

/// Identifier assigned by the record store on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EbookId(Uuid);

impl EbookId {
    /// Time-ordered id, so ids sort in creation order
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for EbookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EbookId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// A persisted ebook.
///
/// `image_ref` is present exactly when `image_url` points at an uploaded cover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EbookRecord {
    pub id: EbookId,
    pub title: String,
    pub book_link: String,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

/// Validated ebook that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEbook {
    pub title: String,
    pub book_link: String,
    pub image_url: String,
    pub image_ref: Option<String>,
}

impl NewEbook {
    pub fn with_placeholder(title: String, book_link: String) -> Self {
        Self {
            title,
            book_link,
            image_url: PLACEHOLDER_COVER_URL.to_string(),
            image_ref: None,
        }
    }

    pub fn with_cover(title: String, book_link: String, cover: StoredImage) -> Self {
        Self {
            title,
            book_link,
            image_url: cover.url,
            image_ref: Some(cover.reference),
        }
    }

    pub fn into_record(self, id: EbookId) -> EbookRecord {
        EbookRecord {
            id,
            title: self.title,
            book_link: self.book_link,
            image_url: self.image_url,
            image_ref: self.image_ref,
        }
    }
}

/// Input of a create request. Required fields are optional here so that
/// missing values surface as validation errors rather than extraction errors.
#[derive(Debug, Clone, Default)]
pub struct CreateEbook {
    pub title: Option<String>,
    pub book_link: Option<String>,
    pub image: Option<ImageUpload>,
}

/// Partial update. `None` keeps the stored value; so does an empty or blank string.
#[derive(Debug, Clone, Default)]
pub struct EbookPatch {
    pub title: Option<String>,
    pub book_link: Option<String>,
    pub image: Option<ImageUpload>,
}

/// What happened to a stored image the service tried to release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageCleanup {
    /// There was no uploaded image to release
    NotNeeded,
    Deleted,
    /// The image store no longer had the image
    AlreadyGone,
    /// The image store refused or failed; the image may be orphaned
    Failed(String),
}

impl ImageCleanup {
    pub fn warning(&self) -> Option<String> {
        match self {
            ImageCleanup::Failed(reason) => {
                Some(format!("stored cover image could not be deleted: {reason}"))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EbookUpdated {
    pub record: EbookRecord,
    /// Release outcome for the cover replaced by this update
    pub previous_cover: ImageCleanup,
}

#[derive(Debug, Clone)]
pub struct EbookDeleted {
    pub record: EbookRecord,
    pub cover: ImageCleanup,
}

/// Body returned by `PUT /api/ebooks/{id}`: the record, plus a warning when
/// the replaced cover could not be deleted.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateResponse {
    #[serde(flatten)]
    pub record: EbookRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Body returned by `DELETE /api/ebooks/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub message: String,
    pub id: EbookId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}
