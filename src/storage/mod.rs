//! Snapshot-backed SQLite storage.
//!
//! The engine runs entirely in memory and is persisted as a full byte image.
//!
//! # Submodules
//!
//! - [`engine`] - SQL engine adapter (run/exec/export/restore)
//! - [`query`] - Validated query builder producing `{sql, params}`
//! - [`transaction`] - Savepoint transactions and batch writes
//! - [`mapper`] - Positional rows to named and typed records
//! - [`schema`] - Table and index DDL, seed data
//! - [`migrations`] - Versioned schema upgrades
//! - [`snapshot`] - External byte stores
//! - [`lifecycle`] - The [`Database`] handle

pub mod engine;
pub mod lifecycle;
pub mod mapper;
pub mod migrations;
pub mod query;
pub mod schema;
pub mod snapshot;
pub mod transaction;

pub use engine::{Engine, EngineModule, ResultSet};
pub use lifecycle::{Database, DatabaseStats, TableStats};
pub use query::{Direction, Query, QueryBuilder};
pub use snapshot::{FileStore, MemoryStore, SnapshotStore, SNAPSHOT_KEY};
pub use transaction::{
    batch_transaction, create_batch_inserter, is_in_transaction, transaction, transaction_async,
    transaction_depth, BatchInserter, BatchOptions, TxContext,
};
