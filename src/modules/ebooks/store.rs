//! Record store for ebooks: the trait the service depends on plus the
//! SurrealDB and in-memory implementations.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shelf_db::Database;
use shelf_kernel::Migration;
use thiserror::Error;
use tokio::sync::RwLock;

use super::models::{EbookId, EbookRecord, NewEbook};

pub const TABLE: &str = "ebook";

/// Schema for the `ebook` table, applied once by the migration runner.
pub fn migrations() -> Vec<Migration> {
    vec![Migration {
        id: "001_init",
        up: r#"
            DEFINE TABLE ebook SCHEMAFULL;
            DEFINE FIELD title     ON ebook TYPE string ASSERT $value != "";
            DEFINE FIELD book_link ON ebook TYPE string ASSERT $value != "";
            DEFINE FIELD image_url ON ebook TYPE string ASSERT $value != "";
            DEFINE FIELD image_ref ON ebook TYPE option<string>;
            "#,
    }]
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(surrealdb::Error),

    /// The connection failed mid-call; the write may or may not have landed
    #[error("database call interrupted: {0}")]
    Interrupted(String),

    #[error("stored ebook is malformed: {0}")]
    Corrupt(String),

    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether a failed write may still have been committed
    pub fn outcome_unknown(&self) -> bool {
        matches!(self, StoreError::Interrupted(_))
    }
}

impl From<surrealdb::Error> for StoreError {
    fn from(err: surrealdb::Error) -> Self {
        match err {
            surrealdb::Error::Api(
                api @ (surrealdb::error::Api::Ws(_) | surrealdb::error::Api::Http(_)),
            ) => StoreError::Interrupted(api.to_string()),
            other => StoreError::Database(other),
        }
    }
}

#[async_trait]
pub trait EbookStore: Send + Sync {
    async fn find_all(&self) -> Result<Vec<EbookRecord>, StoreError>;

    async fn find_by_id(&self, id: &EbookId) -> Result<Option<EbookRecord>, StoreError>;

    /// Store a new ebook under a freshly generated id
    async fn insert(&self, ebook: NewEbook) -> Result<EbookRecord, StoreError>;

    /// Replace an existing ebook. Returns `None` when the id no longer exists.
    async fn save(&self, record: EbookRecord) -> Result<Option<EbookRecord>, StoreError>;

    async fn delete_by_id(&self, id: &EbookId) -> Result<Option<EbookRecord>, StoreError>;
}

/// Document layout in the `ebook` table; the record id lives in the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EbookDocument {
    title: String,
    book_link: String,
    image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image_ref: Option<String>,
}

impl EbookDocument {
    fn into_record(self, id: EbookId) -> EbookRecord {
        EbookRecord {
            id,
            title: self.title,
            book_link: self.book_link,
            image_url: self.image_url,
            image_ref: self.image_ref,
        }
    }
}

impl From<NewEbook> for EbookDocument {
    fn from(ebook: NewEbook) -> Self {
        Self {
            title: ebook.title,
            book_link: ebook.book_link,
            image_url: ebook.image_url,
            image_ref: ebook.image_ref,
        }
    }
}

impl From<EbookRecord> for EbookDocument {
    fn from(record: EbookRecord) -> Self {
        Self {
            title: record.title,
            book_link: record.book_link,
            image_url: record.image_url,
            image_ref: record.image_ref,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EbookRow {
    id: String,
    title: String,
    book_link: String,
    image_url: String,
    #[serde(default)]
    image_ref: Option<String>,
}

impl TryFrom<EbookRow> for EbookRecord {
    type Error = StoreError;

    fn try_from(row: EbookRow) -> Result<Self, Self::Error> {
        let id = row
            .id
            .parse::<EbookId>()
            .map_err(|e| StoreError::Corrupt(format!("record key '{}': {e}", row.id)))?;
        Ok(EbookRecord {
            id,
            title: row.title,
            book_link: row.book_link,
            image_url: row.image_url,
            image_ref: row.image_ref,
        })
    }
}

/// Ebook store on a SurrealDB table. Keys are UUID v7 strings.
#[derive(Clone)]
pub struct SurrealEbookStore {
    db: Database,
}

impl SurrealEbookStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EbookStore for SurrealEbookStore {
    async fn find_all(&self) -> Result<Vec<EbookRecord>, StoreError> {
        let mut response = self
            .db
            .query(
                "SELECT meta::id(id) AS id, title, book_link, image_url, image_ref \
                 FROM type::table($table)",
            )
            .bind(("table", TABLE))
            .await?;
        let rows: Vec<EbookRow> = response.take(0)?;

        rows.into_iter().map(EbookRecord::try_from).collect()
    }

    async fn find_by_id(&self, id: &EbookId) -> Result<Option<EbookRecord>, StoreError> {
        let document: Option<EbookDocument> = self.db.select((TABLE, id.to_string())).await?;
        Ok(document.map(|document| document.into_record(*id)))
    }

    async fn insert(&self, ebook: NewEbook) -> Result<EbookRecord, StoreError> {
        let id = EbookId::generate();
        let created: Option<EbookDocument> = self
            .db
            .create((TABLE, id.to_string()))
            .content(EbookDocument::from(ebook))
            .await?;

        created
            .map(|document| document.into_record(id))
            .ok_or_else(|| StoreError::Unavailable(format!("create of {TABLE}:{id} returned nothing")))
    }

    async fn save(&self, record: EbookRecord) -> Result<Option<EbookRecord>, StoreError> {
        let id = record.id;
        let updated: Option<EbookDocument> = self
            .db
            .update((TABLE, id.to_string()))
            .content(EbookDocument::from(record))
            .await?;
        Ok(updated.map(|document| document.into_record(id)))
    }

    async fn delete_by_id(&self, id: &EbookId) -> Result<Option<EbookRecord>, StoreError> {
        let deleted: Option<EbookDocument> = self.db.delete((TABLE, id.to_string())).await?;
        Ok(deleted.map(|document| document.into_record(*id)))
    }
}

/// Process-local store. Iteration follows id order, which is creation order.
#[derive(Debug, Default)]
pub struct MemoryEbookStore {
    records: RwLock<BTreeMap<EbookId, EbookRecord>>,
}

impl MemoryEbookStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EbookStore for MemoryEbookStore {
    async fn find_all(&self) -> Result<Vec<EbookRecord>, StoreError> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn find_by_id(&self, id: &EbookId) -> Result<Option<EbookRecord>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn insert(&self, ebook: NewEbook) -> Result<EbookRecord, StoreError> {
        let record = ebook.into_record(EbookId::generate());
        self.records
            .write()
            .await
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn save(&self, record: EbookRecord) -> Result<Option<EbookRecord>, StoreError> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn delete_by_id(&self, id: &EbookId) -> Result<Option<EbookRecord>, StoreError> {
        Ok(self.records.write().await.remove(id))
    }
}
