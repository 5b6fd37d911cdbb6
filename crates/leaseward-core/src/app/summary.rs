//! End-of-run summary: duration, peak memory, last cycle status.

use std::path::Path;
use std::time::Duration;

use tracing::{error, info, warn};

use super::status::RunReport;

const PROC_STATUS: &str = "/proc/self/status";
const CGROUP_MEMORY_MAX: &str = "/sys/fs/cgroup/memory.max";

const SIZE_UNITS: [&str; 6] = ["b", "kb", "mb", "gb", "tb", "pb"];

/// `"1 days 2 hours 3 minutes 4.50 secondes"`; zero units are left out.
/// Below one second only the seconds are shown: `"0.25 secondes"`.
pub fn human_duration(elapsed: Duration) -> String {
    let total = elapsed.as_secs_f64();
    if total < 1.0 {
        return format!("{total:.2} secondes");
    }

    let whole = elapsed.as_secs();
    let days = whole / 86_400;
    let hours = whole % 86_400 / 3_600;
    let minutes = whole % 3_600 / 60;
    let seconds = total - (whole - whole % 60) as f64;

    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{days} days "));
    }
    if hours > 0 {
        out.push_str(&format!("{hours} hours "));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes} minutes "));
    }
    out.push_str(&format!("{seconds:.2} secondes"));
    out
}

/// `1536` → `"1.5 kb"`. At most two decimals, trailing zeros dropped.
pub fn human_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = format!("{value:.2}");
    let rounded = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{rounded} {}", SIZE_UNITS[unit])
}

/// `VmHWM` (resident high-water mark) of a `/proc/<pid>/status` text, in bytes.
pub fn parse_vm_hwm(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmHWM:"))?;
    let mut parts = line["VmHWM:".len()..].split_whitespace();
    let value: u64 = parts.next()?.parse().ok()?;
    match parts.next() {
        Some("kB") | None => Some(value * 1024),
        Some(_) => None,
    }
}

/// Content of a cgroup v2 `memory.max`; `"max"` means unlimited.
pub fn parse_memory_max(content: &str) -> Option<u64> {
    let content = content.trim();
    if content == "max" {
        return None;
    }
    content.parse().ok()
}

pub fn peak_memory() -> Option<u64> {
    read(PROC_STATUS).as_deref().and_then(parse_vm_hwm)
}

pub fn cgroup_memory_limit() -> Option<u64> {
    read(CGROUP_MEMORY_MAX).as_deref().and_then(parse_memory_max)
}

fn read(path: impl AsRef<Path>) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

/// Peak usage as a rounded percentage of the limit.
pub fn memory_percent(peak: u64, limit: u64) -> Option<u64> {
    if limit == 0 {
        return None;
    }
    Some(((peak as f64) * 100.0 / (limit as f64)).round() as u64)
}

/// Inputs of the summary log lines, gathered once the driver stopped.
#[derive(Debug, Clone)]
pub struct RunSummary<'a> {
    pub report: &'a RunReport,
    pub subscription: &'a str,
    pub peak_memory: Option<u64>,
    pub memory_limit: Option<u64>,
    pub memory_warning_percent: u8,
}

impl RunSummary<'_> {
    pub fn log(&self) {
        let report = self.report;
        let memory = self
            .peak_memory
            .map(human_size)
            .unwrap_or_else(|| "unknown".to_string());
        info!(
            subscription = self.subscription,
            stop = ?report.stop,
            cycles = report.cycles,
            processed = report.processed,
            failed = report.failed,
            errored = report.errored,
            last_cycle = %report.last_cycle,
            "consumer ended in {} with peak memory usage to {}",
            human_duration(report.elapsed),
            memory
        );

        if let (Some(peak), Some(limit)) = (self.peak_memory, self.memory_limit)
            && let Some(percent) = memory_percent(peak, limit)
            && percent > u64::from(self.memory_warning_percent)
        {
            warn!(
                subscription = self.subscription,
                percent_memory_used = percent,
                limit = %human_size(limit),
                "consumer used more than {}% of the memory allowed",
                self.memory_warning_percent
            );
        }

        if !report.last_cycle.is_success() {
            error!(
                subscription = self.subscription,
                last_cycle = %report.last_cycle,
                "consumer ended after a failed cycle"
            );
        }
    }
}
