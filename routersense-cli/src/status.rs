use colored::*;
use reqwest::Client;
use serde_json::Value;
use std::error::Error;

pub const FIELDS: [(&str, &str); 6] = [
    ("cpu_percent", "%"),
    ("memory_percent", "%"),
    ("disk_usage_percent", "%"),
    ("shm_usage_percent", "%"),
    ("temperature_celsius", "°C"),
    ("load_average", ""),
];

pub async fn fetch_status(client: &Client, url: &str) -> Result<Value, Box<dyn Error>> {
    Ok(client
        .get(format!("{url}/status"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?)
}

/// Renders one reading, which is either a bare value or `{"error": ...}`.
pub fn format_reading(value: &Value, unit: &str) -> Result<String, String> {
    if let Some(err) = value.get("error").and_then(Value::as_str) {
        return Err(err.to_string());
    }
    match value {
        Value::Array(items) => Ok(items
            .iter()
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .collect::<Vec<_>>()
            .join(" ")),
        Value::Null => Err("missing".to_string()),
        other => Ok(format!("{other}{unit}")),
    }
}

pub async fn run_status(client: &Client, url: &str, json: bool) -> Result<(), Box<dyn Error>> {
    let status = fetch_status(client, url).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    if status.get("client_id").is_none() {
        let err = status
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unexpected response");
        return Err(format!("agent reported: {err}").into());
    }

    println!("{:<22} {}", "client_id", status["client_id"].as_str().unwrap_or("-"));
    for (field, unit) in FIELDS {
        match format_reading(&status[field], unit) {
            Ok(text) => println!("{field:<22} {text}"),
            Err(err) => println!("{field:<22} {}", format!("error: {err}").red()),
        }
    }
    let ip = &status["ext_ip_info"];
    match ip.get("error").and_then(Value::as_str) {
        Some(err) => println!("{:<22} {}", "ext_ip_info", format!("error: {err}").red()),
        None => println!(
            "{:<22} {} ({})",
            "ext_ip_info",
            ip["ip"].as_str().unwrap_or("-"),
            ip["as_name"].as_str().unwrap_or("-")
        ),
    }
    Ok(())
}
