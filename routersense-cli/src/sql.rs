use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::error::Error;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    result: Vec<Value>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScriptResponse {
    error: Option<String>,
}

pub fn parse_params(raw: &[String]) -> Result<Vec<Value>, Box<dyn Error>> {
    raw.iter()
        .map(|p| {
            serde_json::from_str(p).map_err(|e| format!("invalid --param {p:?}: {e}").into())
        })
        .collect()
}

pub async fn run_query(
    client: &Client,
    url: &str,
    sql: &str,
    params: &[String],
) -> Result<(), Box<dyn Error>> {
    let params = parse_params(params)?;
    let body = if params.is_empty() {
        json!({ "sql_query": sql })
    } else {
        json!({ "sql_query": sql, "params": params })
    };
    let resp: QueryResponse = client
        .post(format!("{url}/run_sql"))
        .json(&body)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    for row in &resp.result {
        println!("{row}");
    }
    match resp.error {
        Some(err) => Err(format!("query failed: {err}").into()),
        None => Ok(()),
    }
}

pub async fn run_script(client: &Client, url: &str, file: &Path) -> Result<(), Box<dyn Error>> {
    let script = std::fs::read_to_string(file)
        .map_err(|e| format!("failed to read {}: {e}", file.display()))?;
    let resp: ScriptResponse = client
        .post(format!("{url}/run_sql_script"))
        .json(&json!([{ "sql_query": script }]))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    match resp.error {
        Some(err) => Err(format!("script failed: {err}").into()),
        None => {
            println!("script applied");
            Ok(())
        }
    }
}
