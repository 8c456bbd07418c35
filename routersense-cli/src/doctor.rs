use colored::*;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::error::Error;

use crate::status::{fetch_status, format_reading};

/// Usage above this makes the agent reboot the device.
const REBOOT_THRESHOLD: f64 = 90.0;

#[derive(Deserialize, Debug)]
struct HealthResponse {
    #[allow(dead_code)]
    status: String,
    version: String,
}

pub async fn run_doctor(client: &Client, url: &str) -> Result<(), Box<dyn Error>> {
    println!("{}", "RouterSense Doctor".bold().cyan());
    println!("{}", "Checking device health...".dimmed());
    println!();

    let mut all_good = true;

    print!("• {:<20}", "Agent Connectivity:");
    match client.get(format!("{url}/healthz")).send().await {
        Ok(resp) if resp.status().is_success() => match resp.json::<HealthResponse>().await {
            Ok(health) => println!("{}", format!("OK (v{})", health.version).green()),
            Err(_) => println!("{}", "OK (Invalid JSON)".yellow()),
        },
        Ok(resp) => {
            println!("{}", format!("FAIL (Status {})", resp.status()).red());
            all_good = false;
        }
        Err(e) => {
            println!("{}", format!("FAIL ({e})").red());
            println!("  → Is routersensed running? Try 'systemctl status routersensed'");
            return Ok(());
        }
    }

    print!("• {:<20}", "Client Identity:");
    let status = match fetch_status(client, url).await {
        Ok(status) => status,
        Err(e) => {
            println!("{}", format!("FAIL ({e})").red());
            return Ok(());
        }
    };
    match status.get("client_id").and_then(Value::as_str) {
        Some(id) => println!("{}", id.green()),
        None => {
            println!("{}", "FAIL (Client ID not found)".red());
            println!("  → Expected a /home/piNN directory on the device.");
            println!();
            println!("{}", "System has issues. See above.".bold().yellow());
            return Ok(());
        }
    }

    for (field, label) in [
        ("memory_percent", "Memory:"),
        ("disk_usage_percent", "Disk:"),
        ("shm_usage_percent", "Shared Memory:"),
    ] {
        print!("• {label:<20}");
        match status[field].as_f64() {
            Some(pct) if pct > REBOOT_THRESHOLD => {
                println!("{}", format!("{pct}% (over {REBOOT_THRESHOLD}%, reboot pending)").red());
                all_good = false;
            }
            Some(pct) => println!("{}", format!("{pct}%").green()),
            None => {
                let msg = format_reading(&status[field], "%").err().unwrap_or_default();
                println!("{}", format!("FAIL ({msg})").red());
                all_good = false;
            }
        }
    }

    print!("• {:<20}", "CPU:");
    match format_reading(&status["cpu_percent"], "%") {
        Ok(text) => println!("{}", text.green()),
        Err(err) => println!("{}", format!("unavailable ({err})").yellow()),
    }

    print!("• {:<20}", "Temperature:");
    match format_reading(&status["temperature_celsius"], "°C") {
        Ok(text) => println!("{}", text.green()),
        Err(err) => println!("{}", format!("unavailable ({err})").yellow()),
    }

    print!("• {:<20}", "External IP Lookup:");
    match status["ext_ip_info"].get("error").and_then(Value::as_str) {
        Some(err) => println!("{}", format!("FAIL ({err})").yellow()),
        None => println!("{}", "OK".green()),
    }

    println!();
    if all_good {
        println!("{}", "Device is healthy.".bold().green());
    } else {
        println!("{}", "System has issues. See above.".bold().yellow());
    }
    Ok(())
}
