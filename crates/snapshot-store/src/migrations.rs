//! Database migrations.

use crate::error::{Result, StoreError};
use log::{debug, info};
use sqlx::SqlitePool;

const SCHEMA_VERSION: i64 = 1;

pub(crate) async fn run(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| StoreError::MigrationFailed {
        reason: e.to_string(),
    })?;

    let current_version: Option<i64> =
        sqlx::query_scalar("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(pool)
            .await
            .map_err(|e| StoreError::MigrationFailed {
                reason: e.to_string(),
            })?;
    let current_version = current_version.unwrap_or(0);

    if current_version >= SCHEMA_VERSION {
        debug!("Database schema is up to date (version {current_version})");
        return Ok(());
    }

    info!("Migrating database from version {current_version} to {SCHEMA_VERSION}");
    if current_version < 1 {
        migrate_to_v1(pool).await?;
    }

    Ok(())
}

async fn migrate_to_v1(pool: &SqlitePool) -> Result<()> {
    // Timestamps are stored as milliseconds since the Unix epoch, UTC
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS hosts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hostname TEXT NOT NULL UNIQUE,
            ip_address TEXT,
            first_seen INTEGER NOT NULL,
            last_seen INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            host_id INTEGER NOT NULL REFERENCES hosts(id) ON DELETE CASCADE,
            timestamp INTEGER NOT NULL,
            total_processes INTEGER NOT NULL DEFAULT 0,
            total_cpu_percent REAL NOT NULL DEFAULT 0,
            total_memory_mb REAL NOT NULL DEFAULT 0
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_snapshots_host_timestamp ON snapshots(host_id, timestamp DESC)",
        "CREATE INDEX IF NOT EXISTS idx_snapshots_timestamp ON snapshots(timestamp)",
        r#"
        CREATE TABLE IF NOT EXISTS processes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            snapshot_id INTEGER NOT NULL REFERENCES snapshots(id) ON DELETE CASCADE,
            pid INTEGER NOT NULL,
            name TEXT NOT NULL,
            cpu_percent REAL NOT NULL DEFAULT 0,
            memory_mb REAL NOT NULL DEFAULT 0,
            parent_pid INTEGER,
            command_line TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'running',
            create_time INTEGER,
            UNIQUE(snapshot_id, pid)
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_processes_snapshot_parent ON processes(snapshot_id, parent_pid)",
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    let mut tx = pool.begin().await?;
    for statement in statements {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::MigrationFailed {
                reason: e.to_string(),
            })?;
    }
    tx.commit().await?;

    info!("Database schema migrated to version 1");
    Ok(())
}
