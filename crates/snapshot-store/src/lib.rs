//! Snapshot store: ingestion, storage and queries for per-host process snapshots.
//!
//! Snapshots are stored in SQLite. Each ingested payload becomes one host upsert, one snapshot
//! row and one row per process, all written in a single transaction. Parent/child relations are
//! never stored as edges, they are rebuilt from `parent_pid` on every read (see
//! [`ProcessForest`]).

pub mod api;
mod error;
mod forest;
mod ingest;
mod migrations;
mod model;
mod query;
mod retention;
mod store;


pub use error::{Result, StoreError};
pub use forest::ProcessForest;
pub use model::*;
pub use retention::RETENTION_WINDOW;
pub use store::SnapshotStore;
