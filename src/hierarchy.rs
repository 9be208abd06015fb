//! Parent/child reconstruction over the flat list of one cycle.

use std::collections::HashSet;

use procwatch_shared::ProcessRecord;

/// Set `has_children` on every record: true iff another record of the cycle names it as parent
pub fn annotate_children(records: &mut [ProcessRecord]) {
    let parents: HashSet<i64> = records
        .iter()
        .filter_map(|record| record.parent_pid.filter(|&ppid| ppid != record.pid))
        .collect();

    for record in records.iter_mut() {
        record.has_children = Some(parents.contains(&record.pid));
    }
}

/// Keep only the records without a parent (`parent_pid` absent or 0).
///
/// A record whose parent is not part of the cycle keeps its `parent_pid` and is dropped here.
pub fn root_set(records: Vec<ProcessRecord>) -> Vec<ProcessRecord> {
    records.into_iter().filter(ProcessRecord::is_root).collect()
}

/// Records to transmit for one cycle.
///
/// With hierarchy mode enabled the records are annotated and reduced to the root set, otherwise
/// the flat list is returned unchanged.
pub fn build_hierarchy(mut records: Vec<ProcessRecord>, enabled: bool) -> Vec<ProcessRecord> {
    if !enabled {
        return records;
    }
    annotate_children(&mut records);
    root_set(records)
}
