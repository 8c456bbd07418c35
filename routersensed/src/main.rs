use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use routersensed::api::{self, AppState};
use routersensed::collectors::ipinfo::IpInfoClient;
use routersensed::config::DEFAULT_CONFIG_PATH;
use routersensed::enforcement::{Enforcer, SystemActions, has_reboot_capability};
use routersensed::telemetry::{Aggregator, log_probe_layout};
use routersensed::types::{CLIENT_ID_NOT_FOUND, StatusResponse};
use routersensed::watchdog::{MemoryGuard, SnapshotWatchdog};
use routersensed::{Config, Gateway, logging};

#[derive(Parser, Debug)]
#[command(version, about = "RouterSense device health agent")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override api.listen_addr
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Print one health snapshot as JSON and exit
    #[arg(long)]
    once: bool,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("[main] ctrl-c handler failed: {err}");
            std::future::pending::<()>().await;
        }
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                warn!("[main] SIGTERM handler failed: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    tokio::select! {
        _ = ctrl_c => info!("[main] ctrl-c received, shutting down"),
        _ = terminate => info!("[main] SIGTERM received, shutting down"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::load(&args.config)?;
    if let Some(addr) = args.listen {
        config.api.listen_addr = addr;
    }
    logging::init(&config.logging)?;

    if !args.config.exists() {
        warn!(
            "[config] {} not found, using built-in defaults",
            args.config.display()
        );
    }
    if config.network.ipinfo_token.is_none() {
        warn!("[config] no ipinfo token configured; ext_ip_info will report API errors");
    }
    log_probe_layout(&config.probes);

    let actions = Arc::new(SystemActions::new(config.watchdog.reboot_command.clone()));
    let enforcer = Arc::new(Enforcer::new(actions));
    if !has_reboot_capability() {
        warn!("[enforcement] CAP_SYS_BOOT not held; reboot corrective action will likely fail");
    }

    let ipinfo = IpInfoClient::new(&config.network)?;
    let watchdog = SnapshotWatchdog::new(
        Arc::clone(&enforcer),
        config.watchdog.reboot_threshold_pct,
    );
    let aggregator = Aggregator::new(config.probes.clone(), ipinfo, watchdog);

    if args.once {
        let response = match aggregator.snapshot().await {
            Ok(snapshot) => StatusResponse::Snapshot(Box::new(snapshot)),
            Err(_) => StatusResponse::Error {
                error: CLIENT_ID_NOT_FOUND.to_string(),
            },
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let gateway = Gateway::open(&config.database.path)
        .await
        .with_context(|| format!("failed to open {}", config.database.path.display()))?;

    if config.watchdog.memory_guard_interval_secs > 0 {
        let guard = MemoryGuard::new(
            config.probes.proc_meminfo.clone(),
            config.watchdog.memory_kill_threshold_pct,
            Arc::clone(&enforcer),
        );
        let interval = Duration::from_secs(config.watchdog.memory_guard_interval_secs);
        tokio::spawn(guard.run(interval));
    } else {
        info!("[memory-guard] disabled by config");
    }

    let app = api::router(Arc::new(AppState {
        aggregator,
        gateway,
    }));

    let listener = tokio::net::TcpListener::bind(config.api.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.api.listen_addr))?;
    info!("[main] listening on {}", config.api.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("[main] stopped");
    Ok(())
}
