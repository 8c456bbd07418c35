use std::path::Path;

use super::{ProbeError, read_file};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryCounters {
    pub total_kb: u64,
    pub available_kb: u64,
}

impl MemoryCounters {
    /// Used share of memory in percent; 0 when the kernel reports no memory.
    pub fn used_percent(&self) -> f64 {
        if self.total_kb == 0 {
            return 0.0;
        }
        let available = self.available_kb.min(self.total_kb);
        (self.total_kb - available) as f64 * 100.0 / self.total_kb as f64
    }
}

/// Pull `MemTotal` and `MemAvailable` out of `/proc/meminfo` content.
pub fn parse_meminfo(content: &str) -> Result<MemoryCounters, ProbeError> {
    let mut total = None;
    let mut available = None;

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let slot = match parts.next() {
            Some("MemTotal:") => &mut total,
            Some("MemAvailable:") => &mut available,
            _ => continue,
        };
        let value = parts
            .next()
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| ProbeError::malformed("/proc/meminfo", line.to_string()))?;
        *slot = Some(value);
    }

    match (total, available) {
        (Some(total_kb), Some(available_kb)) => Ok(MemoryCounters {
            total_kb,
            available_kb,
        }),
        (None, _) => Err(ProbeError::malformed("/proc/meminfo", "MemTotal missing")),
        (_, None) => Err(ProbeError::malformed(
            "/proc/meminfo",
            "MemAvailable missing",
        )),
    }
}

pub async fn read_memory(path: &Path) -> Result<MemoryCounters, ProbeError> {
    let content = read_file(path).await?;
    parse_meminfo(&content)
}
