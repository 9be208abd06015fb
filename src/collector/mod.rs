//! Process enumeration.
//!
//! [`ProcessTable`] is the seam over the OS process table, [`ProcessEnumerator`] turns one scan
//! into the [`ProcessRecord`]s of a cycle.

mod enumerator;
mod table;

pub use enumerator::{CollectionSummary, ProcessEnumerator};
pub use table::{ProcessEntry, ProcessScanError, ProcessTable, RawProcess, SysinfoProcessTable};

#[cfg(test)]
pub(crate) use table::tests::FakeProcessTable;
