//! HTTP surface. Thin: each route maps one request body onto one
//! aggregator or gateway call. Data-store and probe failures are reported
//! inside a 200 response, never as a transport error.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::gateway::{Gateway, ResultRow, Statement};
use crate::telemetry::Aggregator;
use crate::types::{CLIENT_ID_NOT_FOUND, StatusResponse};

pub struct AppState {
    pub aggregator: Aggregator,
    pub gateway: Gateway,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .route("/run_sql", post(run_sql))
        .route("/run_sql_script", post(run_sql_script))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let response = match state.aggregator.snapshot().await {
        Ok(snapshot) => StatusResponse::Snapshot(Box::new(snapshot)),
        Err(err) => {
            log::warn!("[api] /status: {err}");
            StatusResponse::Error {
                error: CLIENT_ID_NOT_FOUND.to_string(),
            }
        }
    };
    Json(response)
}

/// Either a bare JSON string (legacy) or `{sql_query, params?}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum QueryBody {
    Legacy(String),
    Structured(Statement),
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub result: Vec<ResultRow>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_query: Option<String>,
}

async fn run_sql(
    State(state): State<Arc<AppState>>,
    Json(body): Json<QueryBody>,
) -> Json<QueryResponse> {
    let (statement, echo) = match body {
        QueryBody::Legacy(sql) => (Statement::new(sql.clone()), Some(sql)),
        QueryBody::Structured(stmt) => (stmt, None),
    };
    let outcome = state
        .gateway
        .run_query(&statement.sql, statement.params.as_deref().unwrap_or_default())
        .await;
    Json(QueryResponse {
        result: outcome.result,
        error: outcome.error,
        input_query: echo,
    })
}

/// Either a bare JSON string script (legacy) or an array of statements.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ScriptBody {
    Legacy(String),
    Batch(Vec<Statement>),
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ScriptResponse {
    Batch {
        error: Option<String>,
    },
    Legacy {
        input_query: String,
        error: Option<String>,
        result: Option<Value>,
    },
}

async fn run_sql_script(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ScriptBody>,
) -> Json<ScriptResponse> {
    let response = match body {
        ScriptBody::Legacy(script) => {
            let outcome = state
                .gateway
                .run_script(&[Statement::new(script.clone())])
                .await;
            ScriptResponse::Legacy {
                input_query: script,
                error: outcome.error,
                result: None,
            }
        }
        ScriptBody::Batch(statements) => ScriptResponse::Batch {
            error: state.gateway.run_script(&statements).await.error,
        },
    };
    Json(response)
}
