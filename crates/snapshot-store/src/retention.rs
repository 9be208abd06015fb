use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use log::info;

use crate::error::Result;
use crate::store::SnapshotStore;

/// Snapshots older than this are removed by [`SnapshotStore::clear_old_data`]
pub const RETENTION_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

impl SnapshotStore {
    /// Delete every snapshot taken strictly before `cutoff`, with its process rows.
    ///
    /// Returns the number of deleted snapshots.
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        // Process rows go with their snapshot (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM snapshots WHERE timestamp < ?")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            info!("Cleared {deleted} snapshots older than {cutoff}");
        }
        Ok(deleted)
    }

    /// Apply the fixed [`RETENTION_WINDOW`] relative to `now`
    pub async fn clear_old_data(&self, now: DateTime<Utc>) -> Result<u64> {
        let window = TimeDelta::seconds(RETENTION_WINDOW.as_secs() as i64);
        self.prune_older_than(now - window).await
    }
}
