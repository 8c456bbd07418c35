use anyhow::{Context, Result, bail};
use log::warn;
use serde::Deserialize;
use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/routersense/routersense.toml";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub probes: ProbeConfig,
    pub watchdog: WatchdogConfig,
    pub network: NetworkConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub listen_addr: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 58745)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file shared with the inspector. Created if missing.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/dev/shm/inspector/inspector.db"),
        }
    }
}

/// Kernel and filesystem exposure points read by the collectors.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub home_dir: PathBuf,
    pub proc_stat: PathBuf,
    pub proc_loadavg: PathBuf,
    pub proc_meminfo: PathBuf,
    pub thermal_zone: PathBuf,
    pub df_command: String,
    pub disk_mount: PathBuf,
    pub shm_mount: PathBuf,
    /// Delay between the two `/proc/stat` samples. Must be non-zero.
    pub cpu_window_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            home_dir: PathBuf::from("/home"),
            proc_stat: PathBuf::from("/proc/stat"),
            proc_loadavg: PathBuf::from("/proc/loadavg"),
            proc_meminfo: PathBuf::from("/proc/meminfo"),
            thermal_zone: PathBuf::from("/sys/class/thermal/thermal_zone0/temp"),
            df_command: "df".to_string(),
            disk_mount: PathBuf::from("/"),
            shm_mount: PathBuf::from("/dev/shm"),
            cpu_window_ms: 1000,
        }
    }
}

impl ProbeConfig {
    pub fn cpu_window(&self) -> Duration {
        Duration::from_millis(self.cpu_window_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Memory, disk or shm usage above this reboots the device.
    pub reboot_threshold_pct: f64,
    /// Memory usage above this makes the agent SIGTERM itself.
    pub memory_kill_threshold_pct: f64,
    /// Poll interval of the memory guard; 0 disables the loop.
    pub memory_guard_interval_secs: u64,
    pub reboot_command: Vec<String>,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            reboot_threshold_pct: 90.0,
            memory_kill_threshold_pct: 80.0,
            memory_guard_interval_secs: 5,
            reboot_command: vec!["reboot".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub ipinfo_endpoint: String,
    pub ipinfo_token: Option<String>,
    pub timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ipinfo_endpoint: "https://api.ipinfo.io/lite/me".to_string(),
            ipinfo_token: None,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset.
    pub level: String,
    /// Append log output here instead of stderr.
    pub file: Option<PathBuf>,
    /// Rotate `file` once it would grow past this size; 0 never rotates.
    pub max_bytes: u64,
    /// Rotated files kept as `file.1` .. `file.N`.
    pub backups: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_bytes: 64 * 1024 * 1024,
            backups: 16,
        }
    }
}

impl Config {
    /// Load the config file, falling back to defaults when it does not exist.
    /// Environment overrides are applied on top.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            Self::from_toml(&raw)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.probes.cpu_window_ms == 0 {
            bail!("probes.cpu_window_ms must be greater than 0");
        }
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(path) = env::var("ROUTERSENSE_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Ok(addr) = env::var("ROUTERSENSE_LISTEN") {
            match addr.parse() {
                Ok(addr) => self.api.listen_addr = addr,
                Err(err) => warn!("[config] ignoring ROUTERSENSE_LISTEN={addr}: {err}"),
            }
        }
        if let Ok(token) = env::var("ROUTERSENSE_IPINFO_TOKEN") {
            if !token.trim().is_empty() {
                self.network.ipinfo_token = Some(token.trim().to_string());
            }
        }
    }
}
