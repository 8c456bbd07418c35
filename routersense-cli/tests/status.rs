use assert_cmd::Command;
use httpmock::prelude::*;
use predicates::prelude::*;

const SNAPSHOT: &str = r#"{
    "client_id": "07",
    "cpu_percent": 12.5,
    "load_average": ["0.10", "0.20", "0.30"],
    "memory_percent": 41,
    "temperature_celsius": {"error": "failed to read /sys/class/thermal/thermal_zone0/temp"},
    "disk_usage_percent": 55,
    "shm_usage_percent": 3,
    "ext_ip_info": {"ip": "203.0.113.7", "as_name": "Example Net"}
}"#;

fn cli() -> Command {
    Command::cargo_bin("routersense-cli").unwrap()
}

#[tokio::test]
async fn status_prints_readings_and_errors() {
    let server = MockServer::start_async().await;
    let _m = server
        .mock_async(|when, then| {
            when.method(GET).path("/status");
            then.status(200)
                .header("content-type", "application/json")
                .body(SNAPSHOT);
        })
        .await;

    cli()
        .args(["--no-color", "--url", &server.base_url(), "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("07"))
        .stdout(predicate::str::contains("12.5%"))
        .stdout(predicate::str::contains("0.10 0.20 0.30"))
        .stdout(predicate::str::contains("error: failed to read"))
        .stdout(predicate::str::contains("203.0.113.7"));
}

#[tokio::test]
async fn status_json_passes_body_through() {
    let server = MockServer::start_async().await;
    let _m = server
        .mock_async(|when, then| {
            when.method(GET).path("/status");
            then.status(200)
                .header("content-type", "application/json")
                .body(SNAPSHOT);
        })
        .await;

    cli()
        .args(["--url", &server.base_url(), "status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""memory_percent": 41"#));
}

#[tokio::test]
async fn status_reports_missing_identity() {
    let server = MockServer::start_async().await;
    let _m = server
        .mock_async(|when, then| {
            when.method(GET).path("/status");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"error":"Client ID not found"}"#);
        })
        .await;

    cli()
        .args(["--url", &server.base_url(), "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Client ID not found"));
}
