//! Self-preservation thresholds.
//!
//! Two rungs: the memory guard polls often and SIGTERMs the agent above 80%
//! memory, leaving the restart to the service manager. The snapshot watchdog
//! runs with every health snapshot and reboots the device once memory, disk
//! or shm passes 90%.

use log::{debug, info, warn};
use nix::sys::signal::Signal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::collectors::ProbeError;
use crate::collectors::memory::read_memory;
use crate::enforcement::{ActionType, Enforcer};
use crate::types::{HealthSnapshot, Reading};

/// Names the first resource above `threshold`. Failed readings never count.
pub fn reboot_reason(snapshot: &HealthSnapshot, threshold: f64) -> Option<String> {
    let fields: [(&str, &Reading<u32>); 3] = [
        ("memory", &snapshot.memory_percent),
        ("disk", &snapshot.disk_usage_percent),
        ("shm", &snapshot.shm_usage_percent),
    ];
    fields.iter().find_map(|(name, reading)| {
        reading
            .value()
            .filter(|pct| f64::from(**pct) > threshold)
            .map(|pct| format!("{name} usage {pct}% > {threshold}%"))
    })
}

pub struct SnapshotWatchdog {
    enforcer: Arc<Enforcer>,
    threshold: f64,
}

impl SnapshotWatchdog {
    pub fn new(enforcer: Arc<Enforcer>, threshold: f64) -> Self {
        Self {
            enforcer,
            threshold,
        }
    }

    /// Reboots the device if the snapshot breaches the threshold.
    /// Returns whether a breach was seen.
    pub async fn evaluate(&self, snapshot: &HealthSnapshot) -> bool {
        match reboot_reason(snapshot, self.threshold) {
            Some(reason) => {
                warn!("[watchdog] {reason}, rebooting device");
                self.enforcer.execute(ActionType::Reboot, &reason).await;
                true
            }
            None => false,
        }
    }
}

pub struct MemoryGuard {
    meminfo: PathBuf,
    threshold: f64,
    enforcer: Arc<Enforcer>,
}

impl MemoryGuard {
    pub fn new(meminfo: PathBuf, threshold: f64, enforcer: Arc<Enforcer>) -> Self {
        Self {
            meminfo,
            threshold,
            enforcer,
        }
    }

    /// Recompute memory usage and SIGTERM ourselves if it is over the limit.
    pub async fn check(&self) -> Result<f64, ProbeError> {
        let pct = read_memory(&self.meminfo).await?.used_percent();
        self.enforce(pct).await;
        Ok(pct)
    }

    pub async fn enforce(&self, mem_percent: f64) -> bool {
        if mem_percent <= self.threshold {
            return false;
        }
        let reason = format!("memory usage {mem_percent:.1}% > {}%", self.threshold);
        warn!("[memory-guard] {reason}, terminating agent");
        self.enforcer
            .execute(
                ActionType::TerminateSelf {
                    pid: std::process::id(),
                    signal: Signal::SIGTERM as i32,
                },
                &reason,
            )
            .await;
        true
    }

    pub async fn run(self, interval: Duration) {
        info!(
            "[memory-guard] polling {} every {:?}, limit {}%",
            self.meminfo.display(),
            interval,
            self.threshold
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.check().await {
                Ok(pct) => debug!("[memory-guard] memory at {pct:.1}%"),
                Err(err) => warn!("[memory-guard] check failed: {err}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enforcement::testing::RecordingActions;
    use serde_json::Value;

    fn snapshot(mem: u32, disk: u32, shm: u32) -> HealthSnapshot {
        HealthSnapshot {
            client_id: "01".to_string(),
            cpu_percent: Reading::Value(12.5),
            load_average: Reading::Value(["0.1".into(), "0.2".into(), "0.3".into()]),
            memory_percent: Reading::Value(mem),
            temperature_celsius: Reading::Value(45.0),
            disk_usage_percent: Reading::Value(disk),
            shm_usage_percent: Reading::Value(shm),
            ext_ip_info: Value::Null,
        }
    }

    fn setup() -> (Arc<RecordingActions>, Arc<Enforcer>) {
        let rec = Arc::new(RecordingActions::default());
        let enforcer = Arc::new(Enforcer::new(rec.clone()));
        (rec, enforcer)
    }

    #[tokio::test]
    async fn memory_breach_reboots_exactly_once() {
        let (rec, enforcer) = setup();
        let dog = SnapshotWatchdog::new(enforcer, 90.0);

        assert!(dog.evaluate(&snapshot(95, 10, 10)).await);
        assert!(dog.evaluate(&snapshot(95, 10, 10)).await);
        assert_eq!(rec.reboots(), 1);
        assert_eq!(rec.terminations(), 0);
    }

    #[tokio::test]
    async fn any_of_three_resources_triggers() {
        for snap in [snapshot(10, 91, 10), snapshot(10, 10, 100)] {
            let (rec, enforcer) = setup();
            let dog = SnapshotWatchdog::new(enforcer, 90.0);
            dog.evaluate(&snap).await;
            assert_eq!(rec.reboots(), 1);
        }
    }

    #[tokio::test]
    async fn at_threshold_does_not_trigger() {
        let (rec, enforcer) = setup();
        let dog = SnapshotWatchdog::new(enforcer, 90.0);
        assert!(!dog.evaluate(&snapshot(90, 90, 90)).await);
        assert_eq!(rec.reboots(), 0);
    }

    #[tokio::test]
    async fn failed_readings_are_not_breaches() {
        let (rec, enforcer) = setup();
        let dog = SnapshotWatchdog::new(enforcer, 90.0);
        let mut snap = snapshot(10, 10, 10);
        snap.disk_usage_percent = Reading::Error {
            error: "df failed".into(),
        };
        assert!(!dog.evaluate(&snap).await);
        assert_eq!(rec.reboots(), 0);
    }

    #[test]
    fn reason_names_resource() {
        let reason = reboot_reason(&snapshot(10, 10, 97), 90.0).unwrap();
        assert!(reason.starts_with("shm usage 97%"));
    }

    #[tokio::test]
    async fn memory_guard_terminates_above_limit() {
        let (rec, enforcer) = setup();
        let guard = MemoryGuard::new(PathBuf::from("/unused"), 80.0, enforcer);

        assert!(!guard.enforce(75.0).await);
        assert_eq!(rec.terminations(), 0);
        assert!(guard.enforce(85.0).await);
        assert_eq!(rec.terminations(), 1);
        assert_eq!(rec.reboots(), 0);
    }

    #[tokio::test]
    async fn memory_guard_reads_meminfo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meminfo");
        let (rec, enforcer) = setup();
        let guard = MemoryGuard::new(path.clone(), 80.0, enforcer);

        std::fs::write(&path, "MemTotal: 1000 kB\nMemAvailable: 250 kB\n").unwrap();
        assert_eq!(guard.check().await.unwrap(), 75.0);
        assert_eq!(rec.terminations(), 0);

        std::fs::write(&path, "MemTotal: 1000 kB\nMemAvailable: 150 kB\n").unwrap();
        assert_eq!(guard.check().await.unwrap(), 85.0);
        assert_eq!(rec.terminations(), 1);
    }

    #[tokio::test]
    async fn memory_guard_surfaces_read_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (rec, enforcer) = setup();
        let guard = MemoryGuard::new(dir.path().join("missing"), 80.0, enforcer);
        assert!(guard.check().await.is_err());
        assert_eq!(rec.terminations(), 0);
    }
}
