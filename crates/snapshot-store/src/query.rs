use log::debug;

use crate::error::{Result, StoreError};
use crate::forest::ProcessForest;
use crate::model::{Host, HostSummary, SnapshotSummary, SnapshotView, StoredProcess};
use crate::store::SnapshotStore;

const SNAPSHOT_COLUMNS: &str = r#"
    s.id, h.hostname, s.timestamp, s.total_processes, s.total_cpu_percent, s.total_memory_mb
"#;

impl SnapshotStore {
    /// Active hosts, ordered by hostname, each with the header of its latest snapshot
    pub async fn list_hosts(&self) -> Result<Vec<HostSummary>> {
        let rows = sqlx::query(
            "SELECT id, hostname, ip_address, first_seen, last_seen, is_active \
             FROM hosts WHERE is_active = 1 ORDER BY hostname",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut hosts = Vec::with_capacity(rows.len());
        for row in &rows {
            let host = Host::from_row(row);
            let latest_snapshot = self.latest_summary(host.id).await?;
            let process_count = latest_snapshot
                .as_ref()
                .map_or(0, |snapshot| snapshot.total_processes);
            hosts.push(HostSummary {
                host,
                latest_snapshot,
                process_count,
            });
        }
        Ok(hosts)
    }

    /// Look a host up by name, whether active or not
    pub async fn host(&self, hostname: &str) -> Result<Option<Host>> {
        let row = sqlx::query(
            "SELECT id, hostname, ip_address, first_seen, last_seen, is_active \
             FROM hosts WHERE hostname = ?",
        )
        .bind(hostname)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(Host::from_row))
    }

    async fn active_host(&self, hostname: &str) -> Result<Host> {
        self.host(hostname)
            .await?
            .filter(|host| host.is_active)
            .ok_or_else(|| StoreError::HostNotFound {
                hostname: hostname.to_string(),
            })
    }

    /// Soft delete (or restore) a host: inactive hosts are hidden from every read
    pub async fn set_host_active(&self, hostname: &str, is_active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE hosts SET is_active = ? WHERE hostname = ?")
            .bind(is_active)
            .bind(hostname)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::HostNotFound {
                hostname: hostname.to_string(),
            });
        }
        debug!("Host {hostname} is_active set to {is_active}");
        Ok(())
    }

    async fn latest_summary(&self, host_id: i64) -> Result<Option<SnapshotSummary>> {
        let row = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots s JOIN hosts h ON h.id = s.host_id \
             WHERE s.host_id = ? ORDER BY s.timestamp DESC, s.id DESC LIMIT 1"
        ))
        .bind(host_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(SnapshotSummary::from_row))
    }

    async fn processes_of(&self, snapshot_id: i64) -> Result<Vec<StoredProcess>> {
        let rows = sqlx::query(
            "SELECT id, pid, name, cpu_percent, memory_mb, parent_pid, command_line, status, \
             create_time FROM processes WHERE snapshot_id = ? ORDER BY pid",
        )
        .bind(snapshot_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(StoredProcess::from_row).collect())
    }

    async fn view_of(&self, summary: SnapshotSummary) -> Result<SnapshotView> {
        let forest = ProcessForest::new(self.processes_of(summary.id).await?);
        Ok(SnapshotView {
            summary,
            processes: forest.views(),
            tree: forest.tree(),
        })
    }

    /// Process forest of a stored snapshot
    pub async fn forest(&self, snapshot_id: i64) -> Result<ProcessForest> {
        Ok(ProcessForest::new(self.processes_of(snapshot_id).await?))
    }

    /// Full snapshot by id
    pub async fn snapshot(&self, snapshot_id: i64) -> Result<SnapshotView> {
        let row = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots s JOIN hosts h ON h.id = s.host_id \
             WHERE s.id = ?"
        ))
        .bind(snapshot_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::SnapshotNotFound { id: snapshot_id })?;
        self.view_of(SnapshotSummary::from_row(&row)).await
    }

    /// Latest snapshot of every active host, newest first
    pub async fn latest_snapshots(&self) -> Result<Vec<SnapshotView>> {
        let host_ids: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM hosts WHERE is_active = 1 ORDER BY hostname")
                .fetch_all(&self.pool)
                .await?;

        let mut summaries = Vec::with_capacity(host_ids.len());
        for host_id in host_ids {
            if let Some(summary) = self.latest_summary(host_id).await? {
                summaries.push(summary);
            }
        }
        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));

        let mut views = Vec::with_capacity(summaries.len());
        for summary in summaries {
            views.push(self.view_of(summary).await?);
        }
        Ok(views)
    }

    /// Latest snapshot of one active host.
    ///
    /// Returns `Ok(None)` when the host exists but never sent a snapshot that is still retained.
    pub async fn host_snapshot(&self, hostname: &str) -> Result<Option<SnapshotView>> {
        let host = self.active_host(hostname).await?;
        match self.latest_summary(host.id).await? {
            Some(summary) => Ok(Some(self.view_of(summary).await?)),
            None => Ok(None),
        }
    }

    /// Snapshot headers of one active host, newest first
    pub async fn host_history(&self, hostname: &str, limit: u32) -> Result<Vec<SnapshotSummary>> {
        let host = self.active_host(hostname).await?;
        let rows = sqlx::query(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots s JOIN hosts h ON h.id = s.host_id \
             WHERE s.host_id = ? ORDER BY s.timestamp DESC, s.id DESC LIMIT ?"
        ))
        .bind(host.id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(SnapshotSummary::from_row).collect())
    }
}
