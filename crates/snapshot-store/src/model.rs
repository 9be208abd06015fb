use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

pub(crate) fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::UNIX_EPOCH)
}

/// A monitored host
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Host {
    pub id: i64,
    pub hostname: String,
    pub ip_address: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub is_active: bool,
}

impl Host {
    pub(crate) fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            hostname: row.get("hostname"),
            ip_address: row.get("ip_address"),
            first_seen: millis_to_datetime(row.get("first_seen")),
            last_seen: millis_to_datetime(row.get("last_seen")),
            is_active: row.get::<i64, _>("is_active") != 0,
        }
    }
}

/// Snapshot header, without its process rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotSummary {
    pub id: i64,
    pub hostname: String,
    pub timestamp: DateTime<Utc>,
    pub total_processes: i64,
    pub total_cpu_percent: f64,
    pub total_memory_mb: f64,
}

impl SnapshotSummary {
    /// Expects the snapshot columns plus `hostname` joined from `hosts`
    pub(crate) fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            hostname: row.get("hostname"),
            timestamp: millis_to_datetime(row.get("timestamp")),
            total_processes: row.get("total_processes"),
            total_cpu_percent: row.get("total_cpu_percent"),
            total_memory_mb: row.get("total_memory_mb"),
        }
    }
}

/// A process row of a stored snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredProcess {
    pub id: i64,
    pub pid: i64,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub parent_pid: Option<i64>,
    pub command_line: String,
    pub status: String,
    pub create_time: Option<DateTime<Utc>>,
}

impl StoredProcess {
    pub(crate) fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            pid: row.get("pid"),
            name: row.get("name"),
            cpu_percent: row.get("cpu_percent"),
            memory_mb: row.get("memory_mb"),
            parent_pid: row.get("parent_pid"),
            command_line: row.get("command_line"),
            status: row.get("status"),
            create_time: row
                .get::<Option<i64>, _>("create_time")
                .map(millis_to_datetime),
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self.parent_pid, None | Some(0))
    }
}

/// A process as exposed to readers, with its derived relations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessView {
    #[serde(flatten)]
    pub process: StoredProcess,
    pub has_children: bool,
    /// Pids of the direct children, ascending
    pub children: Vec<i64>,
}

/// A node of the reconstructed process tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessTreeNode {
    pub pid: i64,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub children: Vec<ProcessTreeNode>,
}

impl ProcessTreeNode {
    /// Number of nodes in this subtree, including itself
    pub fn subtree_size(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(ProcessTreeNode::subtree_size)
            .sum::<usize>()
    }
}

/// A full snapshot: header, flat process list and reconstructed tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotView {
    #[serde(flatten)]
    pub summary: SnapshotSummary,
    pub processes: Vec<ProcessView>,
    /// Roots first, then orphans (whose parent is not part of the snapshot)
    pub tree: Vec<ProcessTreeNode>,
}

/// A host with the header of its latest snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostSummary {
    #[serde(flatten)]
    pub host: Host,
    pub latest_snapshot: Option<SnapshotSummary>,
    pub process_count: i64,
}
