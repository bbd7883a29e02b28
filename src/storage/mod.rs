//! Idempotent persistence of content records.
//!
//! # Overview
//!
//! - **UnitStore**: the store contract, including the insert-then-update
//!   `upsert` every write goes through
//! - **SqliteUnitStore**: sqlx/SQLite implementation
//! - **InMemoryUnitStore**: in-process implementation for tests and dry runs
//! - **Migrations**: schema management
//!
//! # Usage
//!
//! ```rust,ignore
//! use lessonforge::storage::{SqliteUnitStore, UnitStore};
//!
//! let store = SqliteUnitStore::connect("sqlite://lessonforge.db?mode=rwc").await?;
//! store.run_migrations().await?;
//!
//! let stored = store.upsert(&record).await?;
//! let all = store.fetch_all("lecture-42").await?;
//! ```

pub mod database;
pub mod memory;
pub mod migrations;
pub mod schema;
pub mod store;

pub use database::SqliteUnitStore;
pub use memory::InMemoryUnitStore;
pub use migrations::{AppliedMigration, MigrationError, MigrationRunner};
pub use store::{StoreError, UnitStore};
