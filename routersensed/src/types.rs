use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collectors::ProbeError;

/// One probed field of a snapshot: the value, or `{"error": "..."}` in its place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reading<T> {
    Value(T),
    Error { error: String },
}

impl<T> Reading<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Reading::Value(v) => Some(v),
            Reading::Error { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reading::Error { .. })
    }
}

impl<T> From<Result<T, ProbeError>> for Reading<T> {
    fn from(result: Result<T, ProbeError>) -> Self {
        match result {
            Ok(v) => Reading::Value(v),
            Err(err) => Reading::Error {
                error: err.to_string(),
            },
        }
    }
}

/// Point-in-time health report for the device. Built fresh per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub client_id: String,
    pub cpu_percent: Reading<f64>,
    pub load_average: Reading<[String; 3]>,
    pub memory_percent: Reading<u32>,
    pub temperature_celsius: Reading<f64>,
    pub disk_usage_percent: Reading<u32>,
    pub shm_usage_percent: Reading<u32>,
    pub ext_ip_info: Value,
}

/// Body of `GET /status`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StatusResponse {
    Snapshot(Box<HealthSnapshot>),
    Error { error: String },
}

pub const CLIENT_ID_NOT_FOUND: &str = "Client ID not found";
