//! Load average, SoC temperature and filesystem usage.

use std::path::Path;
use tokio::process::Command;

use super::{ProbeError, read_file};

/// First three tokens of `/proc/loadavg`, kept verbatim.
pub fn parse_loadavg(content: &str) -> Result<[String; 3], ProbeError> {
    let mut tokens = content.split_whitespace().map(str::to_string);
    match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(one), Some(five), Some(fifteen)) => Ok([one, five, fifteen]),
        _ => Err(ProbeError::malformed(
            "/proc/loadavg",
            format!("expected three values, got {:?}", content.trim()),
        )),
    }
}

/// Thermal zones report millidegrees Celsius.
pub fn parse_millidegrees(content: &str) -> Result<f64, ProbeError> {
    let raw = content.trim();
    raw.parse::<i64>()
        .map(|milli| milli as f64 / 1000.0)
        .map_err(|_| ProbeError::malformed("thermal zone", format!("{raw:?}")))
}

/// Use% column of the second `df` output line.
///
/// ```text
/// Filesystem     1K-blocks    Used Available Use% Mounted on
/// /dev/root       30485420 5932136  23282620  21% /
/// ```
pub fn parse_df_percent(output: &str) -> Result<u32, ProbeError> {
    let line = output
        .lines()
        .nth(1)
        .ok_or_else(|| ProbeError::malformed("df output", "missing data line"))?;
    let column = line
        .split_whitespace()
        .nth(4)
        .ok_or_else(|| ProbeError::malformed("df output", line.to_string()))?;
    column
        .trim_end_matches('%')
        .parse::<u32>()
        .map_err(|_| ProbeError::malformed("df output", format!("bad Use% column {column:?}")))
}

pub async fn read_loadavg(path: &Path) -> Result<[String; 3], ProbeError> {
    parse_loadavg(&read_file(path).await?)
}

pub async fn read_temperature(path: &Path) -> Result<f64, ProbeError> {
    parse_millidegrees(&read_file(path).await?)
}

/// Runs `<df_command> <mount>` and returns the usage percentage.
pub async fn filesystem_usage(df_command: &str, mount: &Path) -> Result<u32, ProbeError> {
    let command = format!("{df_command} {}", mount.display());
    let output = Command::new(df_command)
        .arg(mount)
        .output()
        .await
        .map_err(|err| ProbeError::Command {
            command: command.clone(),
            details: err.to_string(),
        })?;

    if !output.status.success() {
        return Err(ProbeError::Command {
            command,
            details: format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    parse_df_percent(&String::from_utf8_lossy(&output.stdout))
}
