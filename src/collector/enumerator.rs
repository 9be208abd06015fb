use procwatch_shared::{ProcessRecord, round2};

use super::table::{ProcessTable, RawProcess};
use crate::config::CollectionConfig;
use crate::prelude::*;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Counters of one enumeration pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CollectionSummary {
    pub checked: usize,
    pub skipped_errors: usize,
    pub skipped_thresholds: usize,
    pub collected: usize,
    pub truncated: bool,
}

/// Reads the process table once per cycle and produces the records to send
pub struct ProcessEnumerator<T> {
    table: T,
    config: CollectionConfig,
}

impl<T: ProcessTable> ProcessEnumerator<T> {
    pub fn new(table: T, config: CollectionConfig) -> Self {
        Self { table, config }
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    fn to_record(&self, raw: RawProcess) -> ProcessRecord {
        ProcessRecord {
            pid: raw.pid,
            name: raw.name,
            cpu_percent: round2(f64::from(raw.cpu_usage)),
            memory_mb: round2(raw.memory_bytes as f64 / BYTES_PER_MB),
            parent_pid: raw.parent_pid.filter(|&ppid| ppid != 0),
            command_line: if self.config.collect_command_line {
                raw.command.join(" ")
            } else {
                String::new()
            },
            status: raw.status,
            create_time: raw.start_time.map(|secs| secs as f64),
            has_children: None,
        }
    }

    fn below_thresholds(&self, record: &ProcessRecord) -> bool {
        self.config.apply_thresholds
            && record.cpu_percent < self.config.min_cpu_percent
            && record.memory_mb < self.config.min_memory_mb
    }

    /// Enumerate the process table once.
    ///
    /// A process that cannot be read is skipped when `continue-on-error` is set, otherwise it
    /// aborts the whole pass. Reaching `max-processes` stops the pass early without failing it.
    pub fn collect(&mut self) -> Result<(Vec<ProcessRecord>, CollectionSummary)> {
        let entries = self
            .table
            .scan()
            .context("Failed to read the process table")?;

        let mut summary = CollectionSummary::default();
        let mut records = Vec::new();
        for entry in entries {
            // Only flag truncation when an entry is actually left out
            if records.len() >= self.config.max_processes {
                warn!(
                    "Reached maximum process limit ({})",
                    self.config.max_processes
                );
                summary.truncated = true;
                break;
            }
            summary.checked += 1;
            let raw = match entry {
                Ok(raw) => raw,
                Err(err) if self.config.continue_on_error => {
                    debug!("Could not collect info for process: {err}");
                    summary.skipped_errors += 1;
                    continue;
                }
                Err(err) => return Err(Error::new(err).context("Process enumeration aborted")),
            };

            let record = self.to_record(raw);
            if self.below_thresholds(&record) {
                summary.skipped_thresholds += 1;
                continue;
            }
            trace!(
                "Added process: {} (PID: {}) - CPU: {}%, Memory: {} MB",
                record.name, record.pid, record.cpu_percent, record.memory_mb
            );
            records.push(record);
        }
        summary.collected = records.len();

        info!(
            "Process collection summary: checked {}, skipped {} unreadable, skipped {} below thresholds, collected {}",
            summary.checked, summary.skipped_errors, summary.skipped_thresholds, summary.collected
        );
        Ok((records, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{FakeProcessTable, ProcessEntry, ProcessScanError};
    use rstest::rstest;

    fn raw(pid: i64, parent_pid: Option<i64>) -> RawProcess {
        RawProcess {
            pid,
            name: format!("proc-{pid}"),
            cpu_usage: 1.234_567,
            memory_bytes: 10 * 1024 * 1024 + 5 * 1024,
            parent_pid,
            status: "sleeping".to_string(),
            command: vec![format!("/usr/bin/proc-{pid}"), "--flag".to_string()],
            start_time: Some(1_700_000_000),
        }
    }

    fn enumerator(
        entries: Vec<ProcessEntry>,
        config: CollectionConfig,
    ) -> ProcessEnumerator<FakeProcessTable> {
        ProcessEnumerator::new(FakeProcessTable::new(entries), config)
    }

    #[test]
    fn test_records_are_converted_and_rounded() {
        let mut enumerator = enumerator(
            vec![Ok(raw(1, Some(0))), Ok(raw(2, Some(1)))],
            CollectionConfig::default(),
        );
        let (records, summary) = enumerator.collect().unwrap();

        assert_eq!(summary.collected, 2);
        assert_eq!(records[0].parent_pid, None);
        assert_eq!(records[1].parent_pid, Some(1));
        assert_eq!(records[0].cpu_percent, 1.23);
        assert_eq!(records[0].memory_mb, 10.0);
        assert_eq!(records[0].create_time, Some(1_700_000_000.0));
        assert_eq!(records[0].has_children, None);
        // Command line collection is off by default, the field stays in the payload
        assert_eq!(records[0].command_line, "");
    }

    #[test]
    fn test_command_line_is_joined_when_enabled() {
        let config = CollectionConfig {
            collect_command_line: true,
            ..Default::default()
        };
        let (records, _) = enumerator(vec![Ok(raw(7, None))], config).collect().unwrap();
        assert_eq!(records[0].command_line, "/usr/bin/proc-7 --flag");
    }

    #[rstest]
    #[case::vanished(ProcessScanError::Vanished { pid: 2 })]
    #[case::access_denied(ProcessScanError::AccessDenied { pid: 2 })]
    #[case::zombie(ProcessScanError::Zombie { pid: 2 })]
    fn test_unreadable_process_is_skipped(#[case] err: ProcessScanError) {
        let mut enumerator = enumerator(
            vec![Ok(raw(1, None)), Err(err), Ok(raw(3, Some(1)))],
            CollectionConfig::default(),
        );
        let (records, summary) = enumerator.collect().unwrap();

        let pids: Vec<i64> = records.iter().map(|r| r.pid).collect();
        assert_eq!(pids, vec![1, 3]);
        assert_eq!(
            summary,
            CollectionSummary {
                checked: 3,
                skipped_errors: 1,
                skipped_thresholds: 0,
                collected: 2,
                truncated: false,
            }
        );
    }

    #[test]
    fn test_unreadable_process_aborts_without_continue_on_error() {
        let config = CollectionConfig {
            continue_on_error: false,
            ..Default::default()
        };
        let mut enumerator = enumerator(
            vec![Ok(raw(1, None)), Err(ProcessScanError::AccessDenied { pid: 2 })],
            config,
        );
        let err = enumerator.collect().unwrap_err();
        assert_eq!(
            err.downcast_ref::<ProcessScanError>(),
            Some(&ProcessScanError::AccessDenied { pid: 2 })
        );
    }

    #[test]
    fn test_table_failure_is_reported() {
        let mut table = FakeProcessTable::new(vec![Ok(raw(1, None))]);
        table.fail = true;
        let mut enumerator = ProcessEnumerator::new(table, CollectionConfig::default());

        let err = enumerator.collect().unwrap_err();
        assert_eq!(err.to_string(), "Failed to read the process table");
        assert_eq!(enumerator.table().scans, 1);
    }

    #[test]
    fn test_truncation_is_soft() {
        let config = CollectionConfig {
            max_processes: 3,
            ..Default::default()
        };
        let entries = (1..=10).map(|pid| Ok(raw(pid, None))).collect();
        let (records, summary) = enumerator(entries, config).collect().unwrap();

        assert_eq!(records.len(), 3);
        assert!(summary.truncated);
        assert_eq!(summary.checked, 3);
    }

    #[test]
    fn test_exact_limit_is_not_truncated() {
        let config = CollectionConfig {
            max_processes: 3,
            ..Default::default()
        };
        let entries = (1..=3).map(|pid| Ok(raw(pid, None))).collect();
        let (records, summary) = enumerator(entries, config).collect().unwrap();

        assert_eq!(records.len(), 3);
        assert!(!summary.truncated);
        assert_eq!(summary.checked, 3);
    }

    #[rstest]
    #[case::disabled(false, 0.0, 0.0, 1)]
    #[case::both_below(true, 0.0, 0.5, 0)]
    #[case::cpu_above(true, 0.5, 0.5, 1)]
    #[case::memory_above(true, 0.0, 2.0, 1)]
    fn test_thresholds(
        #[case] apply_thresholds: bool,
        #[case] cpu_usage: f32,
        #[case] memory_mb: f64,
        #[case] expected: usize,
    ) {
        let config = CollectionConfig {
            apply_thresholds,
            min_cpu_percent: 0.1,
            min_memory_mb: 1.0,
            ..Default::default()
        };
        let process = RawProcess {
            cpu_usage,
            memory_bytes: (memory_mb * BYTES_PER_MB) as u64,
            ..raw(1, None)
        };
        let (records, summary) = enumerator(vec![Ok(process)], config).collect().unwrap();
        assert_eq!(records.len(), expected);
        assert_eq!(summary.skipped_thresholds, 1 - expected);
    }
}
