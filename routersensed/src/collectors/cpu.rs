//! Aggregate CPU utilisation from two `/proc/stat` samples.
//!
//! Format of the aggregate line (values in USER_HZ ticks):
//!   cpu  user nice system idle iowait irq softirq steal guest guest_nice
//!
//! busy  = user + nice + system + irq + softirq + steal
//! total = busy + idle + iowait
//!
//! guest time is already folded into user by the kernel and is ignored.

use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;

use super::{ProbeError, read_file};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawCounterSample {
    pub busy_ticks: u64,
    pub total_ticks: u64,
}

/// Parse the `cpu ` line out of `/proc/stat` content.
pub fn parse_stat(content: &str) -> Result<RawCounterSample, ProbeError> {
    let line = content
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| ProbeError::malformed("/proc/stat", "no aggregate cpu line"))?;

    let mut fields = [0u64; 8];
    let mut seen = 0;
    for (slot, token) in fields.iter_mut().zip(line.split_whitespace().skip(1)) {
        *slot = token
            .parse()
            .map_err(|_| ProbeError::malformed("/proc/stat", format!("bad counter {token:?}")))?;
        seen += 1;
    }
    // user, nice, system, idle are present on every kernel we care about
    if seen < 4 {
        return Err(ProbeError::malformed(
            "/proc/stat",
            format!("expected at least 4 counters, got {seen}"),
        ));
    }

    let [user, nice, system, idle, iowait, irq, softirq, steal] = fields;
    let busy = user + nice + system + irq + softirq + steal;
    Ok(RawCounterSample {
        busy_ticks: busy,
        total_ticks: busy + idle + iowait,
    })
}

/// Busy share of the window between two samples, in percent, one decimal.
/// Exact ties round to even.
pub fn rate(first: RawCounterSample, second: RawCounterSample) -> Result<f64, ProbeError> {
    if second.total_ticks <= first.total_ticks {
        return Err(ProbeError::CountersStalled);
    }
    let total = (second.total_ticks - first.total_ticks) as f64;
    let busy = second.busy_ticks.saturating_sub(first.busy_ticks) as f64;
    let pct = (100.0 * busy / total).clamp(0.0, 100.0);
    Ok((pct * 10.0).round_ties_even() / 10.0)
}

pub struct CpuSampler {
    stat_path: PathBuf,
    window: Duration,
}

impl CpuSampler {
    pub fn new(stat_path: PathBuf, window: Duration) -> Self {
        Self { stat_path, window }
    }

    pub async fn sample(&self) -> Result<RawCounterSample, ProbeError> {
        let content = read_file(&self.stat_path).await?;
        parse_stat(&content)
    }

    /// Takes two samples `window` apart. Holds nothing across the sleep.
    pub async fn measure(&self) -> Result<f64, ProbeError> {
        let first = self.sample().await?;
        sleep(self.window).await;
        let second = self.sample().await?;
        rate(first, second)
    }
}
