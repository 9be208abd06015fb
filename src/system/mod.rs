use lazy_static::lazy_static;
use procwatch_shared::round2;
use serde::Serialize;
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, RefreshKind, System};

use crate::prelude::*;

const GB: f64 = (1024 * 1024 * 1024) as f64;

lazy_static! {
    /// Hostname reported by the OS, resolved once
    static ref SYSTEM_HOSTNAME: Option<String> = System::host_name();
}

/// Hostname to report when the configuration does not override it
pub fn system_hostname() -> Result<String> {
    SYSTEM_HOSTNAME
        .clone()
        .filter(|name| !name.trim().is_empty())
        .ok_or(anyhow!("Failed to get host name, set `hostname` in the configuration"))
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SystemInfo {
    pub host: String,
    pub os: String,
    pub os_version: String,
    pub kernel_version: String,
    pub arch: String,
    pub cpu_brand: String,
    pub cpu_cores: Option<usize>,
    pub cpu_threads: usize,
    pub total_memory_gb: f64,
    pub available_memory_gb: f64,
    pub disk_total_gb: f64,
    pub disk_free_gb: f64,
}

#[cfg(test)]
impl SystemInfo {
    pub fn test() -> Self {
        SystemInfo {
            host: "web-01".to_string(),
            os: "ubuntu".to_string(),
            os_version: "22.04".to_string(),
            kernel_version: "6.5.0-1020-aws".to_string(),
            arch: "x86_64".to_string(),
            cpu_brand: "Intel(R) Xeon(R) CPU E5-2686 v4 @ 2.30GHz".to_string(),
            cpu_cores: Some(2),
            cpu_threads: 4,
            total_memory_gb: 8.0,
            available_memory_gb: 5.25,
            disk_total_gb: 100.0,
            disk_free_gb: 60.5,
        }
    }
}

impl SystemInfo {
    pub fn new(host: &str) -> Result<Self> {
        let os = System::distribution_id();
        let os_version = System::os_version().unwrap_or_else(|| "unknown".to_string());
        let kernel_version = System::kernel_version().unwrap_or_else(|| "unknown".to_string());
        let arch = System::cpu_arch();

        let s = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        let cpu_brand = s
            .cpus()
            .first()
            .map(|cpu| cpu.brand().to_string())
            .ok_or(anyhow!("Failed to get CPU info"))?;

        let disks = Disks::new_with_refreshed_list();
        let (disk_total, disk_free) = disks.list().iter().fold((0, 0), |(total, free), disk| {
            (total + disk.total_space(), free + disk.available_space())
        });

        Ok(SystemInfo {
            host: host.to_string(),
            os,
            os_version,
            kernel_version,
            arch,
            cpu_brand,
            cpu_cores: s.physical_core_count(),
            cpu_threads: s.cpus().len(),
            total_memory_gb: round2(s.total_memory() as f64 / GB),
            available_memory_gb: round2(s.available_memory() as f64 / GB),
            disk_total_gb: round2(disk_total as f64 / GB),
            disk_free_gb: round2(disk_free as f64 / GB),
        })
    }

    fn lines(&self) -> Vec<String> {
        let cores = self
            .cpu_cores
            .map(|cores| cores.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        vec![
            format!("Name: {}", self.host),
            format!(
                "Operating System: {} {} (kernel {}, {})",
                self.os, self.os_version, self.kernel_version, self.arch
            ),
            format!("Processor: {}", self.cpu_brand),
            format!("Cores: {cores}, Threads: {}", self.cpu_threads),
            format!(
                "RAM (GB): {} total, {} used, {} available",
                self.total_memory_gb,
                round2(self.total_memory_gb - self.available_memory_gb),
                self.available_memory_gb
            ),
            format!(
                "Storage (GB): {} total, {} used, {} free",
                self.disk_total_gb,
                round2(self.disk_total_gb - self.disk_free_gb),
                self.disk_free_gb
            ),
        ]
    }

    /// Log a short summary of the machine the agent runs on
    pub fn display(&self) {
        info!("System information for {}", self.host);
        for line in self.lines() {
            info!("  {line}");
        }
    }
}
