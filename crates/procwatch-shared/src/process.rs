use serde::{Deserialize, Serialize};

/// A single process as observed during one collection cycle.
///
/// Records are built by the agent's enumerator, annotated once by the hierarchy builder and
/// discarded after delivery. They are never persisted by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: i64,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    /// `None` (or `Some(0)` from stores that kept the raw OS value) means "no parent"
    pub parent_pid: Option<i64>,
    /// Empty when command line collection is disabled or the value could not be read
    pub command_line: String,
    pub status: String,
    /// Process creation time, in seconds since the Unix epoch
    pub create_time: Option<f64>,
    /// Only set once the hierarchy builder ran over the cycle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_children: Option<bool>,
}

impl ProcessRecord {
    /// Whether this record belongs to the root set of its cycle.
    ///
    /// Orphans (a parent pid that is not part of the cycle) are not roots.
    pub fn is_root(&self) -> bool {
        matches!(self.parent_pid, None | Some(0))
    }
}

/// Round a metric to 2 decimal places, keeping payloads stable between cycles
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
