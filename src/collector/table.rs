use sysinfo::{
    Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, ThreadKind,
    UpdateKind,
};
use thiserror::Error;

use crate::prelude::*;

/// A process as read from the OS, before any unit conversion
#[derive(Debug, Clone, PartialEq)]
pub struct RawProcess {
    pub pid: i64,
    pub name: String,
    /// Percentage of one core since the previous scan
    pub cpu_usage: f32,
    pub memory_bytes: u64,
    pub parent_pid: Option<i64>,
    pub status: String,
    /// Empty when the command line was not requested or is not readable
    pub command: Vec<String>,
    /// Seconds since the Unix epoch
    pub start_time: Option<u64>,
}

/// Why a single process could not be read. Never fatal for the table as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessScanError {
    #[error("process {pid} vanished during the scan")]
    Vanished { pid: i64 },
    #[error("access denied to process {pid}")]
    AccessDenied { pid: i64 },
    #[error("process {pid} is a zombie")]
    Zombie { pid: i64 },
}

pub type ProcessEntry = std::result::Result<RawProcess, ProcessScanError>;

/// Access to the process table of the host.
///
/// The outer `Result` is a table level failure: nothing could be read at all.
pub trait ProcessTable {
    fn scan(&mut self) -> Result<Vec<ProcessEntry>>;
}

/// [`ProcessTable`] backed by `sysinfo`.
///
/// The `System` handle is kept between scans: CPU usage is computed from the difference between
/// two refreshes, so the first scan reports 0% for every process.
pub struct SysinfoProcessTable {
    system: System,
    collect_command_line: bool,
}

impl SysinfoProcessTable {
    pub fn new(collect_command_line: bool) -> Self {
        Self {
            system: System::new(),
            collect_command_line,
        }
    }

    fn refresh_kind(&self) -> ProcessRefreshKind {
        let kind = ProcessRefreshKind::nothing().with_cpu().with_memory();
        if self.collect_command_line {
            kind.with_cmd(UpdateKind::OnlyIfNotSet)
        } else {
            kind
        }
    }
}

fn pid_to_i64(pid: Pid) -> i64 {
    i64::from(pid.as_u32())
}

/// On Linux the table also lists every userland thread, with its owning process as parent.
/// Kernel threads are real processes and are kept.
fn is_userland_thread(process: &Process) -> bool {
    matches!(process.thread_kind(), Some(ThreadKind::Userland))
}

fn read_process(pid: Pid, process: &Process, collect_command_line: bool) -> ProcessEntry {
    let pid = pid_to_i64(pid);
    match process.status() {
        ProcessStatus::Zombie => return Err(ProcessScanError::Zombie { pid }),
        ProcessStatus::Dead => return Err(ProcessScanError::Vanished { pid }),
        _ => {}
    }

    let name = process.name().to_string_lossy().into_owned();
    if name.is_empty() {
        return Err(ProcessScanError::AccessDenied { pid });
    }

    let command = if collect_command_line {
        process
            .cmd()
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    } else {
        Vec::new()
    };

    Ok(RawProcess {
        pid,
        name,
        cpu_usage: process.cpu_usage(),
        memory_bytes: process.memory(),
        // The OS reports "no parent" as pid 0 on some platforms
        parent_pid: process.parent().map(pid_to_i64).filter(|&ppid| ppid != 0),
        status: process.status().to_string().to_lowercase(),
        command,
        start_time: Some(process.start_time()).filter(|&secs| secs > 0),
    })
}

impl ProcessTable for SysinfoProcessTable {
    fn scan(&mut self) -> Result<Vec<ProcessEntry>> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            bail!("Process enumeration is not supported on this platform");
        }

        let refresh_kind = self.refresh_kind();
        self.system
            .refresh_processes_specifics(ProcessesToUpdate::All, true, refresh_kind);

        let mut processes: Vec<(&Pid, &Process)> = self
            .system
            .processes()
            .iter()
            .filter(|(_, process)| !is_userland_thread(process))
            .collect();
        if processes.is_empty() {
            bail!("The process table is empty or could not be read");
        }
        processes.sort_by_key(|(pid, _)| **pid);
        trace!("Scanned {} processes", processes.len());

        Ok(processes
            .into_iter()
            .map(|(pid, process)| read_process(*pid, process, self.collect_command_line))
            .collect())
    }
}
