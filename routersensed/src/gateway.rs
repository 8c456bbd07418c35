//! Serialized access to the shared inspector database.
//!
//! The SQLite engine does not tolerate concurrent writers on independent
//! handles, so the agent owns exactly one connection and every request goes
//! through the lock that wraps it. Reads and writes both take it exclusively,
//! for the whole statement including row materialisation.

use futures_util::TryStreamExt;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, ConnectOptions, Executor, Row, TypeInfo, ValueRef};
use std::path::Path;
use std::str::FromStr;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Columns with this suffix are decoded as JSON when their text parses.
pub const JSON_SUFFIX: &str = "_json";

pub type ResultRow = Map<String, Value>;

/// One statement of a query or batch, with optional positional parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(rename = "sql_query")]
    pub sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<Value>>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: None,
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params: Some(params),
        }
    }

    fn params(&self) -> &[Value] {
        self.params.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryOutcome {
    pub result: Vec<ResultRow>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScriptOutcome {
    pub error: Option<String>,
}

/// Outcome of the best-effort JSON decode of a `_json` column.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonField<'a> {
    Raw(&'a str),
    Decoded(Value),
}

pub fn try_decode(text: &str) -> JsonField<'_> {
    match serde_json::from_str(text) {
        Ok(value) => JsonField::Decoded(value),
        Err(_) => JsonField::Raw(text),
    }
}

pub struct Gateway {
    conn: Mutex<SqliteConnection>,
}

impl Gateway {
    /// Open (creating if needed) the database file. Call once at startup.
    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        let conn = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .connect()
            .await?;
        info!("[gateway] connected to {}", path.display());
        Ok(Self::from_connection(conn))
    }

    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let conn = SqliteConnectOptions::from_str("sqlite::memory:")?
            .connect()
            .await?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: SqliteConnection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Run one statement and materialise its rows under the lock.
    ///
    /// Failures land in `error`; rows fetched before the failure are kept.
    pub async fn run_query(&self, sql: &str, params: &[Value]) -> QueryOutcome {
        let mut result = Vec::new();
        let mut conn = self.conn.lock().await;
        let started = Instant::now();

        let error = {
            let mut rows = bind_params(sqlx::query(sql), params).fetch(&mut *conn);
            loop {
                match rows.try_next().await {
                    Ok(Some(row)) => result.push(decode_row(&row)),
                    Ok(None) => break None,
                    Err(err) => break Some(err.to_string()),
                }
            }
        };

        match &error {
            Some(err) => warn!("[gateway] query failed after {} rows: {err}", result.len()),
            None => debug!(
                "[gateway] query returned {} rows in {:?}",
                result.len(),
                started.elapsed()
            ),
        }
        QueryOutcome { result, error }
    }

    /// Run a batch in order under a single lock acquisition.
    ///
    /// A failing statement does not stop the batch. Only the last failure
    /// is reported.
    pub async fn run_script(&self, statements: &[Statement]) -> ScriptOutcome {
        let mut conn = self.conn.lock().await;
        let mut error = None;

        for (idx, stmt) in statements.iter().enumerate() {
            match execute(&mut conn, stmt).await {
                Ok(affected) => debug!("[gateway] statement {} affected {affected} rows", idx + 1),
                Err(err) => {
                    warn!("[gateway] statement {} failed: {err}", idx + 1);
                    error = Some(format!(
                        "statement {} `{}` failed: {err}",
                        idx + 1,
                        stmt.sql.trim()
                    ));
                }
            }
        }
        ScriptOutcome { error }
    }
}

/// Without parameters the text may hold several `;`-separated statements.
async fn execute(conn: &mut SqliteConnection, stmt: &Statement) -> Result<u64, sqlx::Error> {
    let done = if stmt.params().is_empty() {
        Executor::execute(&mut *conn, sqlx::raw_sql(&stmt.sql)).await?
    } else {
        bind_params(sqlx::query(&stmt.sql), stmt.params())
            .execute(&mut *conn)
            .await?
    };
    Ok(done.rows_affected())
}

fn bind_params<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[Value],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64()),
            },
            Value::String(s) => query.bind(s.clone()),
            Value::Array(_) | Value::Object(_) => query.bind(param.to_string()),
        };
    }
    query
}

fn decode_row(row: &SqliteRow) -> ResultRow {
    let mut out = Map::with_capacity(row.len());
    for column in row.columns() {
        let name = column.name();
        let mut value = decode_column(row, column.ordinal());
        if name.ends_with(JSON_SUFFIX) {
            if let Value::String(text) = &value {
                if let JsonField::Decoded(decoded) = try_decode(text) {
                    value = decoded;
                }
            }
        }
        out.insert(name.to_string(), value);
    }
    out
}

/// Decode by the value's runtime storage class, not the declared column type.
fn decode_column(row: &SqliteRow, idx: usize) -> Value {
    let storage = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return Value::Null,
    };

    let decoded = match storage.as_str() {
        "INTEGER" | "BOOLEAN" => row.try_get_unchecked::<i64, _>(idx).map(Value::from),
        "REAL" | "NUMERIC" => row.try_get_unchecked::<f64, _>(idx).map(Value::from),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(idx)
            .map(|bytes| Value::String(String::from_utf8_lossy(&bytes).into_owned())),
        _ => row.try_get_unchecked::<String, _>(idx).map(Value::String),
    };
    decoded.unwrap_or_else(|err| {
        warn!("[gateway] cannot decode column {idx} ({storage}): {err}");
        Value::Null
    })
}
