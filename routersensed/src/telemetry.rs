//! Health snapshot assembly.

use log::{debug, info, warn};
use thiserror::Error;
use tokio::time::Instant;

use crate::collectors::cpu::CpuSampler;
use crate::collectors::host::{filesystem_usage, read_loadavg, read_temperature};
use crate::collectors::identity::resolve_client_id;
use crate::collectors::ipinfo::IpInfoClient;
use crate::collectors::memory::read_memory;
use crate::config::ProbeConfig;
use crate::types::{HealthSnapshot, Reading};
use crate::watchdog::SnapshotWatchdog;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Client ID not found")]
pub struct ClientIdentityError;

pub struct Aggregator {
    probes: ProbeConfig,
    sampler: CpuSampler,
    ipinfo: IpInfoClient,
    watchdog: SnapshotWatchdog,
}

impl Aggregator {
    pub fn new(probes: ProbeConfig, ipinfo: IpInfoClient, watchdog: SnapshotWatchdog) -> Self {
        let sampler = CpuSampler::new(probes.proc_stat.clone(), probes.cpu_window());
        Self {
            probes,
            sampler,
            ipinfo,
            watchdog,
        }
    }

    /// Collect a fresh snapshot. Slow: blocks for the CPU sampling window
    /// plus the external lookup and two `df` runs, which happen concurrently.
    ///
    /// The reboot watchdog runs before the snapshot is handed back.
    pub async fn snapshot(&self) -> Result<HealthSnapshot, ClientIdentityError> {
        let started = Instant::now();
        let client_id = resolve_client_id(&self.probes.home_dir)
            .await
            .ok_or(ClientIdentityError)?;

        let (cpu, load, memory, temperature, disk, shm, ext_ip_info) = tokio::join!(
            self.sampler.measure(),
            read_loadavg(&self.probes.proc_loadavg),
            read_memory(&self.probes.proc_meminfo),
            read_temperature(&self.probes.thermal_zone),
            filesystem_usage(&self.probes.df_command, &self.probes.disk_mount),
            filesystem_usage(&self.probes.df_command, &self.probes.shm_mount),
            self.ipinfo.lookup(),
        );

        let snapshot = HealthSnapshot {
            client_id,
            cpu_percent: cpu.into(),
            load_average: load.into(),
            memory_percent: memory.map(|m| m.used_percent() as u32).into(),
            temperature_celsius: temperature.into(),
            disk_usage_percent: disk.into(),
            shm_usage_percent: shm.into(),
            ext_ip_info,
        };
        log_field_errors(&snapshot);

        self.watchdog.evaluate(&snapshot).await;
        debug!(
            "[telemetry] snapshot for client {} took {:?}",
            snapshot.client_id,
            started.elapsed()
        );
        Ok(snapshot)
    }
}

fn log_field_errors(snapshot: &HealthSnapshot) {
    let fields: [(&str, Option<&str>); 6] = [
        ("cpu_percent", error_of(&snapshot.cpu_percent)),
        ("load_average", error_of(&snapshot.load_average)),
        ("memory_percent", error_of(&snapshot.memory_percent)),
        ("temperature_celsius", error_of(&snapshot.temperature_celsius)),
        ("disk_usage_percent", error_of(&snapshot.disk_usage_percent)),
        ("shm_usage_percent", error_of(&snapshot.shm_usage_percent)),
    ];
    for (name, err) in fields {
        if let Some(err) = err {
            warn!("[telemetry] {name}: {err}");
        }
    }
}

fn error_of<T>(reading: &Reading<T>) -> Option<&str> {
    match reading {
        Reading::Error { error } => Some(error.as_str()),
        Reading::Value(_) => None,
    }
}

pub fn log_probe_layout(probes: &ProbeConfig) {
    info!(
        "[telemetry] probes: home={} stat={} meminfo={} thermal={} df={} mounts=[{}, {}] window={:?}",
        probes.home_dir.display(),
        probes.proc_stat.display(),
        probes.proc_meminfo.display(),
        probes.thermal_zone.display(),
        probes.df_command,
        probes.disk_mount.display(),
        probes.shm_mount.display(),
        probes.cpu_window(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::enforcement::Enforcer;
    use crate::enforcement::testing::RecordingActions;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::sync::Arc;

    struct FakeHost {
        dir: tempfile::TempDir,
    }

    impl FakeHost {
        fn new(mem_available_kb: u64, df_pct: u32) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path();
            std::fs::create_dir_all(root.join("home/pi09")).unwrap();
            std::fs::write(root.join("stat"), "cpu  10 0 10 80 0 0 0 0 0 0\n").unwrap();
            std::fs::write(root.join("loadavg"), "1.00 0.50 0.25 1/100 42\n").unwrap();
            std::fs::write(
                root.join("meminfo"),
                format!("MemTotal: 1000 kB\nMemAvailable: {mem_available_kb} kB\n"),
            )
            .unwrap();
            std::fs::write(root.join("temp"), "51234\n").unwrap();

            let df = root.join("df");
            std::fs::write(
                &df,
                format!(
                    "#!/bin/sh\necho 'Filesystem 1K-blocks Used Available Use% Mounted on'\n\
                     echo \"fake 100 {df_pct} 0 {df_pct}% $1\"\n"
                ),
            )
            .unwrap();
            std::fs::set_permissions(&df, std::fs::Permissions::from_mode(0o755)).unwrap();
            Self { dir }
        }

        fn root(&self) -> &Path {
            self.dir.path()
        }

        fn probes(&self) -> ProbeConfig {
            let root = self.root();
            ProbeConfig {
                home_dir: root.join("home"),
                proc_stat: root.join("stat"),
                proc_loadavg: root.join("loadavg"),
                proc_meminfo: root.join("meminfo"),
                thermal_zone: root.join("temp"),
                df_command: root.join("df").display().to_string(),
                disk_mount: "/".into(),
                shm_mount: "/dev/shm".into(),
                cpu_window_ms: 5,
            }
        }
    }

    fn aggregator(probes: ProbeConfig) -> (Aggregator, Arc<RecordingActions>) {
        let rec = Arc::new(RecordingActions::default());
        let enforcer = Arc::new(Enforcer::new(rec.clone()));
        let ipinfo = IpInfoClient::new(&NetworkConfig {
            ipinfo_endpoint: "http://127.0.0.1:9/lite/me".into(),
            ipinfo_token: None,
            timeout_ms: 200,
        })
        .unwrap();
        let watchdog = SnapshotWatchdog::new(enforcer, 90.0);
        (Aggregator::new(probes, ipinfo, watchdog), rec)
    }

    #[tokio::test]
    async fn assembles_snapshot_with_per_field_errors() {
        let host = FakeHost::new(400, 21);
        let (agg, rec) = aggregator(host.probes());

        let snap = agg.snapshot().await.unwrap();
        assert_eq!(snap.client_id, "09");
        // static stat file: the counters never advance
        assert!(snap.cpu_percent.is_error());
        assert_eq!(
            snap.load_average.value().unwrap(),
            &["1.00".to_string(), "0.50".to_string(), "0.25".to_string()]
        );
        assert_eq!(snap.memory_percent, Reading::Value(60));
        assert_eq!(snap.temperature_celsius, Reading::Value(51.234));
        assert_eq!(snap.disk_usage_percent, Reading::Value(21));
        assert_eq!(snap.shm_usage_percent, Reading::Value(21));
        assert!(snap.ext_ip_info.get("error").is_some());
        assert_eq!(rec.reboots(), 0);
    }

    #[tokio::test]
    async fn missing_probe_file_only_fails_its_field() {
        let host = FakeHost::new(400, 21);
        std::fs::remove_file(host.root().join("temp")).unwrap();
        let (agg, _) = aggregator(host.probes());

        let snap = agg.snapshot().await.unwrap();
        assert!(snap.temperature_celsius.is_error());
        assert_eq!(snap.memory_percent, Reading::Value(60));
    }

    #[tokio::test]
    async fn no_client_dir_is_identity_error() {
        let host = FakeHost::new(400, 21);
        std::fs::remove_dir(host.root().join("home/pi09")).unwrap();
        let (agg, rec) = aggregator(host.probes());

        assert_eq!(agg.snapshot().await.unwrap_err(), ClientIdentityError);
        assert_eq!(rec.reboots(), 0);
    }

    #[tokio::test]
    async fn full_disk_reboots_before_returning() {
        let host = FakeHost::new(400, 95);
        let (agg, rec) = aggregator(host.probes());

        let snap = agg.snapshot().await.unwrap();
        assert_eq!(snap.disk_usage_percent, Reading::Value(95));
        assert_eq!(rec.reboots(), 1);
        assert_eq!(rec.terminations(), 0);
    }

    #[tokio::test]
    async fn advancing_counters_yield_cpu_rate() {
        let host = FakeHost::new(400, 21);
        let probes = host.probes();
        let stat = probes.proc_stat.clone();
        let sampler = CpuSampler::new(stat.clone(), std::time::Duration::from_millis(50));

        let writer = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            tokio::fs::write(&stat, "cpu  60 0 10 130 0 0 0 0 0 0\n")
                .await
                .unwrap();
        });
        let pct = sampler.measure().await.unwrap();
        writer.await.unwrap();
        assert_eq!(pct, 50.0);
    }
}
