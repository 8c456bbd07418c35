use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::{Client, Url};
use serde_json::{Value, json};
use std::time::Duration;

use crate::config::NetworkConfig;

pub const PARSE_FAILURE: &str = "Failed to parse API response";

/// External IP / geolocation lookup. Best effort: failures become an
/// `{"error": ...}` object instead of failing the snapshot.
#[derive(Clone)]
pub struct IpInfoClient {
    client: Client,
    endpoint: Url,
    token: Option<String>,
}

impl IpInfoClient {
    pub fn new(cfg: &NetworkConfig) -> Result<Self> {
        let endpoint = Url::parse(&cfg.ipinfo_endpoint).context("invalid ipinfo endpoint URL")?;
        let client = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms.max(1)))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            client,
            endpoint,
            token: cfg.ipinfo_token.clone(),
        })
    }

    fn request_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        if let Some(token) = &self.token {
            url.query_pairs_mut().append_pair("token", token);
        }
        url
    }

    pub async fn lookup(&self) -> Value {
        let body = match self.fetch().await {
            Ok(body) => body,
            Err(err) => {
                let message = self.redact(&err.without_url().to_string());
                warn!("[ipinfo] lookup against {} failed: {message}", self.endpoint);
                return json!({ "error": message });
            }
        };
        parse_response(&body)
    }

    async fn fetch(&self) -> Result<String, reqwest::Error> {
        // The body is parsed whatever the status; ipinfo reports errors as JSON.
        let resp = self.client.get(self.request_url()).send().await?;
        debug!("[ipinfo] {} -> {}", self.endpoint, resp.status());
        resp.text().await
    }

    fn redact(&self, message: &str) -> String {
        match &self.token {
            Some(token) if !token.is_empty() => message.replace(token.as_str(), "<redacted>"),
            _ => message.to_string(),
        }
    }
}

pub fn parse_response(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| json!({ "error": PARSE_FAILURE }))
}
