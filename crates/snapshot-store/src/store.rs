use std::path::Path;
use std::str::FromStr;

use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;

use crate::error::Result;
use crate::migrations;

/// Handle on the snapshot database.
///
/// Cloning is cheap, clones share the same connection pool.
#[derive(Clone)]
pub struct SnapshotStore {
    pub(crate) pool: SqlitePool,
    pub(crate) api_key: Option<String>,
}

impl SnapshotStore {
    /// Open a store backed by a private in-memory database, mostly useful for tests
    pub async fn new_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str(":memory:")?
            .foreign_keys(true)
            .log_statements(log::LevelFilter::Trace);

        // Every connection to `:memory:` is a distinct database, keep exactly one alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Open (and create if missing) a store at the given path
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        info!("Opening snapshot store at {}", db_path.display());

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(sqlx::Error::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .log_statements(log::LevelFilter::Trace);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        migrations::run(&pool).await?;
        Ok(Self {
            pool,
            api_key: None,
        })
    }

    /// Require every ingested payload to carry this `api_key`
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Release every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
