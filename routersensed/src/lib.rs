pub mod api;
pub mod collectors;
pub mod config;
pub mod enforcement;
pub mod gateway;
pub mod logging;
pub mod telemetry;
pub mod types;
pub mod watchdog;

pub use config::{Config, LoggingConfig, ProbeConfig, WatchdogConfig};
pub use gateway::{Gateway, Statement};
pub use telemetry::Aggregator;
pub use types::HealthSnapshot;
