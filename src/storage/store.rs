//! The unit store contract.

use async_trait::async_trait;
use thiserror::Error;

use crate::content::{ContentRecord, StoredRecord, UnitKey};

use super::migrations::MigrationError;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with the same idempotency key already exists.
    #[error("Record already exists: {key}")]
    Conflict { key: UnitKey },

    /// No record exists for the key.
    #[error("Record not found: {key}")]
    NotFound { key: UnitKey },

    /// Connection to the database failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row could not be mapped back to a record.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
}

/// Durable storage for content records, keyed by `(parent_id, sequence_number)`.
///
/// Implementations provide the primitive operations; [`UnitStore::upsert`] is
/// built on top of them and is the only write path the pipeline uses.
#[async_trait]
pub trait UnitStore: Send + Sync {
    /// Whether a record exists for `key`.
    async fn exists(&self, key: &UnitKey) -> Result<bool, StoreError>;

    /// Inserts a new record. Fails with [`StoreError::Conflict`] when the key
    /// is already taken; never overwrites.
    async fn insert(&self, record: &ContentRecord) -> Result<StoredRecord, StoreError>;

    /// Replaces the content of the existing record with the same key. Fails
    /// with [`StoreError::NotFound`] when there is none.
    async fn update(&self, record: &ContentRecord) -> Result<(), StoreError>;

    /// Reads one record.
    async fn fetch(&self, key: &UnitKey) -> Result<Option<StoredRecord>, StoreError>;

    /// Reads every record of a parent, ordered by sequence number.
    async fn fetch_all(&self, parent_id: &str) -> Result<Vec<StoredRecord>, StoreError>;

    /// Insert, or on a uniqueness conflict update by key, then re-read.
    ///
    /// Two callers racing on the same key both end up with the one stored
    /// record; neither sees the conflict.
    async fn upsert(&self, record: &ContentRecord) -> Result<StoredRecord, StoreError> {
        match self.insert(record).await {
            Ok(stored) => Ok(stored),
            Err(StoreError::Conflict { key }) => {
                tracing::debug!(
                    parent_id = %key.parent_id,
                    sequence_number = key.sequence_number,
                    "Insert conflicted, updating existing record"
                );
                self.update(record).await?;
                self.fetch(&key).await?.ok_or(StoreError::NotFound { key })
            }
            Err(e) => Err(e),
        }
    }
}
