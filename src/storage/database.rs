//! SQLite-backed unit store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::content::{
    ContentRecord, MultipleChoiceQuestion, StoredRecord, TrueFalseQuestion, UnitKey,
};

use super::migrations::MigrationRunner;
use super::store::{StoreError, UnitStore};

const SELECT_COLUMNS: &str = "id, parent_id, sequence_number, passage_a, passage_b, \
     multiple_choice, true_false, created_at, updated_at";

/// [`UnitStore`] over a sqlx SQLite pool.
#[derive(Clone)]
pub struct SqliteUnitStore {
    pool: SqlitePool,
}

impl SqliteUnitStore {
    /// Connects to the database at `database_url`
    /// (e.g. `sqlite://lessonforge.db?mode=rwc`).
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Private in-memory database with the schema applied.
    ///
    /// Uses a single connection that is never recycled, since every SQLite
    /// memory connection is its own database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Runs database migrations.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        let runner = MigrationRunner::new(self.pool.clone());
        runner.run_migrations().await?;
        Ok(())
    }
}

#[async_trait]
impl UnitStore for SqliteUnitStore {
    async fn exists(&self, key: &UnitKey) -> Result<bool, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM content_records WHERE parent_id = ? AND sequence_number = ? LIMIT 1",
        )
        .bind(&key.parent_id)
        .bind(i64::from(key.sequence_number))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn insert(&self, record: &ContentRecord) -> Result<StoredRecord, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let multiple_choice = serde_json::to_string(&record.multiple_choice)?;
        let true_false = serde_json::to_string(&record.true_false)?;

        let result = sqlx::query(
            r#"
            INSERT INTO content_records (
                id, parent_id, sequence_number, passage_a, passage_b,
                multiple_choice, true_false, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&record.parent_id)
        .bind(i64::from(record.sequence_number))
        .bind(&record.passage_a)
        .bind(&record.passage_b)
        .bind(&multiple_choice)
        .bind(&true_false)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(StoredRecord {
                id,
                record: record.clone(),
                created_at: now,
                updated_at: now,
            }),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::Conflict { key: record.key() })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, record: &ContentRecord) -> Result<(), StoreError> {
        let multiple_choice = serde_json::to_string(&record.multiple_choice)?;
        let true_false = serde_json::to_string(&record.true_false)?;

        let result = sqlx::query(
            r#"
            UPDATE content_records
            SET passage_a = ?, passage_b = ?, multiple_choice = ?, true_false = ?, updated_at = ?
            WHERE parent_id = ? AND sequence_number = ?
            "#,
        )
        .bind(&record.passage_a)
        .bind(&record.passage_b)
        .bind(&multiple_choice)
        .bind(&true_false)
        .bind(Utc::now())
        .bind(&record.parent_id)
        .bind(i64::from(record.sequence_number))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { key: record.key() });
        }

        Ok(())
    }

    async fn fetch(&self, key: &UnitKey) -> Result<Option<StoredRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM content_records \
             WHERE parent_id = ? AND sequence_number = ?"
        ))
        .bind(&key.parent_id)
        .bind(i64::from(key.sequence_number))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_stored).transpose()
    }

    async fn fetch_all(&self, parent_id: &str) -> Result<Vec<StoredRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM content_records \
             WHERE parent_id = ? ORDER BY sequence_number"
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_stored).collect()
    }
}

fn row_to_stored(row: &SqliteRow) -> Result<StoredRecord, StoreError> {
    let id: String = row.try_get("id")?;
    let id = Uuid::parse_str(&id)
        .map_err(|e| StoreError::InvalidRow(format!("bad id '{}': {}", id, e)))?;

    let sequence_number: i64 = row.try_get("sequence_number")?;
    let sequence_number = u32::try_from(sequence_number).map_err(|_| {
        StoreError::InvalidRow(format!("sequence_number out of range: {}", sequence_number))
    })?;

    let multiple_choice: String = row.try_get("multiple_choice")?;
    let true_false: String = row.try_get("true_false")?;
    let multiple_choice: MultipleChoiceQuestion = serde_json::from_str(&multiple_choice)?;
    let true_false: TrueFalseQuestion = serde_json::from_str(&true_false)?;

    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(StoredRecord {
        id,
        record: ContentRecord {
            parent_id: row.try_get("parent_id")?,
            sequence_number,
            passage_a: row.try_get("passage_a")?,
            passage_b: row.try_get("passage_b")?,
            multiple_choice,
            true_false,
        },
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::record;

    #[tokio::test]
    async fn test_insert_then_fetch() {
        let store = SqliteUnitStore::in_memory().await.expect("store");
        let stored = store.insert(&record("lecture-1", 2, "first")).await.expect("insert");

        let key = UnitKey::new("lecture-1", 2);
        assert!(store.exists(&key).await.expect("exists"));
        assert!(!store.exists(&UnitKey::new("lecture-1", 3)).await.expect("exists"));

        let fetched = store.fetch(&key).await.expect("fetch").expect("present");
        assert_eq!(fetched.id, stored.id);
        assert_eq!(fetched.record, stored.record);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_conflict() {
        let store = SqliteUnitStore::in_memory().await.expect("store");
        store.insert(&record("lecture-1", 1, "first")).await.expect("insert");

        let err = store
            .insert(&record("lecture-1", 1, "second"))
            .await
            .expect_err("duplicate key");
        assert!(matches!(err, StoreError::Conflict { key } if key == UnitKey::new("lecture-1", 1)));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = SqliteUnitStore::in_memory().await.expect("store");
        let err = store
            .update(&record("lecture-1", 1, "orphan"))
            .await
            .expect_err("nothing to update");
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_upsert_replaces_content_and_keeps_identity() {
        let store = SqliteUnitStore::in_memory().await.expect("store");
        let first = store.upsert(&record("lecture-1", 1, "first")).await.expect("upsert");
        let second = store.upsert(&record("lecture-1", 1, "second")).await.expect("upsert");

        assert_eq!(first.id, second.id);
        assert!(second.record.passage_a.starts_with("second"));
        assert_eq!(store.fetch_all("lecture-1").await.expect("fetch_all").len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_leave_one_record() {
        let store = SqliteUnitStore::in_memory().await.expect("store");
        let a = record("lecture-1", 4, "racer-a");
        let b = record("lecture-1", 4, "racer-b");

        let (ra, rb) = tokio::join!(store.upsert(&a), store.upsert(&b));
        let (ra, rb) = (ra.expect("a"), rb.expect("b"));
        assert_eq!(ra.id, rb.id);

        let all = store.fetch_all("lecture-1").await.expect("fetch_all");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].sequence_number(), 4);
    }

    #[tokio::test]
    async fn test_fetch_all_is_ordered_and_scoped() {
        let store = SqliteUnitStore::in_memory().await.expect("store");
        for seq in [3, 1, 2] {
            store.insert(&record("lecture-1", seq, "x")).await.expect("insert");
        }
        store.insert(&record("lecture-2", 1, "x")).await.expect("insert");

        let sequence: Vec<u32> = store
            .fetch_all("lecture-1")
            .await
            .expect("fetch_all")
            .iter()
            .map(StoredRecord::sequence_number)
            .collect();
        assert_eq!(sequence, vec![1, 2, 3]);
    }
}
