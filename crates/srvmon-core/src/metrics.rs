//! System status snapshots.

use std::fmt;

use async_trait::async_trait;
use sysinfo::{Disks, System};

use crate::{Error, Result};

/// Origin tag appended to a published status message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusTag {
    Auto,
    Manual,
}

impl fmt::Display for StatusTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("Auto"),
            Self::Manual => f.write_str("Manual"),
        }
    }
}

/// Narrow port for the status snapshot producer.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Human-readable resource snapshot (CPU / memory / disk / uptime).
    async fn status(&self) -> Result<String>;
}

/// Host metrics via sysinfo.
#[derive(Default)]
pub struct SystemMetrics;

impl SystemMetrics {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetricsSource for SystemMetrics {
    async fn status(&self) -> Result<String> {
        // The CPU read needs two refreshes with a delay between them, so the
        // whole sample runs off the async runtime.
        tokio::task::spawn_blocking(collect_snapshot)
            .await
            .map_err(|e| Error::Collaborator(format!("metrics task failed: {e}")))?
    }
}

fn collect_snapshot() -> Result<String> {
    let mut sys = System::new();
    sys.refresh_cpu();
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu();
    sys.refresh_memory();

    let cpu = sys.global_cpu_info().cpu_usage() as f64;
    let memory = percent(sys.used_memory(), sys.total_memory());

    let disks = Disks::new_with_refreshed_list();
    let (total, available) = disks
        .iter()
        .fold((0u64, 0u64), |(total, available), disk| {
            (total + disk.total_space(), available + disk.available_space())
        });
    let disk = percent(total.saturating_sub(available), total);

    let uptime = format_uptime(System::uptime());

    Ok(format!(
        "CPU - {cpu:.1}%\nMemory - {memory:.1}%\nDisk - {disk:.1}%\nUptime - {uptime}"
    ))
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    used as f64 / total as f64 * 100.0
}

fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if days > 0 {
        return format!("{days}d {hours}h {mins}m {secs}s");
    }
    if hours > 0 {
        return format!("{hours}h {mins}m {secs}s");
    }
    format!("{mins}m {secs}s")
}
