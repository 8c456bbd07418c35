//! Irreversible corrective actions: SIGTERM to ourselves and device reboot.
//!
//! Actions go through an [`Enforcer`], which writes the audit line and makes
//! each action fire at most once per process. The side effect itself lives
//! behind [`CorrectiveActions`] so tests can record instead of kill.

use async_trait::async_trait;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ActionType {
    TerminateSelf { pid: u32, signal: i32 },
    Reboot,
}

#[async_trait]
pub trait CorrectiveActions: Send + Sync {
    async fn terminate_self(&self) -> Result<(), String>;
    async fn reboot(&self) -> Result<(), String>;
}

/// Real actions against the running host.
pub struct SystemActions {
    reboot_command: Vec<String>,
}

impl SystemActions {
    pub fn new(reboot_command: Vec<String>) -> Self {
        Self { reboot_command }
    }
}

#[async_trait]
impl CorrectiveActions for SystemActions {
    async fn terminate_self(&self) -> Result<(), String> {
        send_signal(Pid::this(), Signal::SIGTERM)
    }

    async fn reboot(&self) -> Result<(), String> {
        let (program, args) = self
            .reboot_command
            .split_first()
            .ok_or("reboot command is empty")?;
        let status = Command::new(program)
            .args(args)
            .status()
            .await
            .map_err(|e| format!("failed to spawn {program}: {e}"))?;
        if status.success() {
            Ok(())
        } else {
            Err(format!("{program} exited with {status}"))
        }
    }
}

fn send_signal(pid: Pid, signal: Signal) -> Result<(), String> {
    kill(pid, signal).map_err(|errno| format!("kill({pid}, {signal}) failed: {errno}"))
}

/// Whether the process can reboot the device at all.
pub fn has_reboot_capability() -> bool {
    caps::has_cap(None, caps::CapSet::Effective, caps::Capability::CAP_SYS_BOOT).unwrap_or(false)
}

pub struct Enforcer {
    actions: Arc<dyn CorrectiveActions>,
    terminate_issued: AtomicBool,
    reboot_issued: AtomicBool,
}

impl Enforcer {
    pub fn new(actions: Arc<dyn CorrectiveActions>) -> Self {
        Self {
            actions,
            terminate_issued: AtomicBool::new(false),
            reboot_issued: AtomicBool::new(false),
        }
    }

    /// Fire `action` unless it already fired. Returns true when this call issued it.
    ///
    /// Failure of the action is logged and otherwise ignored.
    pub async fn execute(&self, action: ActionType, reason: &str) -> bool {
        let latch = match action {
            ActionType::TerminateSelf { .. } => &self.terminate_issued,
            ActionType::Reboot => &self.reboot_issued,
        };
        if latch.swap(true, Ordering::SeqCst) {
            log::debug!("[enforcement] {action:?} already issued, skipping");
            return false;
        }

        log::warn!(
            target: "routersense_audit",
            "CORRECTIVE_ACTION {} reason={}",
            serde_json::to_string(&action).unwrap_or_else(|_| format!("{action:?}")),
            reason
        );

        let result = match action {
            ActionType::TerminateSelf { .. } => self.actions.terminate_self().await,
            ActionType::Reboot => self.actions.reboot().await,
        };
        if let Err(err) = result {
            log::error!("[enforcement] {action:?} failed: {err}");
        }
        true
    }

    pub fn reboot_issued(&self) -> bool {
        self.reboot_issued.load(Ordering::SeqCst)
    }

    pub fn terminate_issued(&self) -> bool {
        self.terminate_issued.load(Ordering::SeqCst)
    }
}
