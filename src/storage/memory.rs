//! In-process unit store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::content::{ContentRecord, StoredRecord, UnitKey};

use super::store::{StoreError, UnitStore};

/// [`UnitStore`] held in memory. Used by tests and dry runs; the write lock
/// makes insert-if-absent atomic, so the conflict path behaves like SQLite's.
#[derive(Default)]
pub struct InMemoryUnitStore {
    records: RwLock<BTreeMap<UnitKey, StoredRecord>>,
}

impl InMemoryUnitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all parents.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl UnitStore for InMemoryUnitStore {
    async fn exists(&self, key: &UnitKey) -> Result<bool, StoreError> {
        Ok(self.records.read().await.contains_key(key))
    }

    async fn insert(&self, record: &ContentRecord) -> Result<StoredRecord, StoreError> {
        let key = record.key();
        let mut records = self.records.write().await;
        if records.contains_key(&key) {
            return Err(StoreError::Conflict { key });
        }

        let now = Utc::now();
        let stored = StoredRecord {
            id: Uuid::new_v4(),
            record: record.clone(),
            created_at: now,
            updated_at: now,
        };
        records.insert(key, stored.clone());
        Ok(stored)
    }

    async fn update(&self, record: &ContentRecord) -> Result<(), StoreError> {
        let key = record.key();
        let mut records = self.records.write().await;
        let stored = records
            .get_mut(&key)
            .ok_or(StoreError::NotFound { key })?;
        stored.record = record.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn fetch(&self, key: &UnitKey) -> Result<Option<StoredRecord>, StoreError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn fetch_all(&self, parent_id: &str) -> Result<Vec<StoredRecord>, StoreError> {
        // BTreeMap order is (parent_id, sequence_number).
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|stored| stored.record.parent_id == parent_id)
            .cloned()
            .collect())
    }
}
