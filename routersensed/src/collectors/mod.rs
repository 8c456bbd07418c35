//! Host probes feeding the health snapshot.
//!
//! Every probe splits into a pure parser over the file or command output and
//! a thin async reader, so the parsers can be exercised without a live `/proc`.

pub mod cpu;
pub mod host;
pub mod identity;
pub mod ipinfo;
pub mod memory;

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed {what}: {details}")]
    Malformed { what: &'static str, details: String },

    #[error("cpu counters did not advance between samples")]
    CountersStalled,

    #[error("command `{command}` failed: {details}")]
    Command { command: String, details: String },
}

impl ProbeError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn malformed(what: &'static str, details: impl Into<String>) -> Self {
        Self::Malformed {
            what,
            details: details.into(),
        }
    }
}

pub(crate) async fn read_file(path: &Path) -> Result<String, ProbeError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|err| ProbeError::io(path, err))
}
