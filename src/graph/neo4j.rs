//! Neo4j store access over the HTTP transactional endpoint

use crate::config::Neo4jConfig;
use crate::graph::{GraphConnector, GraphSession, Params, Record, StoreError, StoreResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Connector for a Neo4j server.
///
/// Holds the pooled HTTP client and a semaphore bounding the number of open
/// sessions. Each [`Neo4jSession`] owns one permit until it is dropped.
pub struct Neo4jConnector {
    client: Client,
    commit_url: String,
    user: String,
    password: String,
    sessions: Arc<Semaphore>,
}

impl Neo4jConnector {
    pub fn new(config: &Neo4jConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            commit_url: commit_url(&config.uri, &config.database),
            user: config.user.clone(),
            password: config.password.clone(),
            sessions: Arc::new(Semaphore::new(config.max_sessions.max(1))),
        })
    }

    /// Sessions that could be opened right now
    pub fn available_sessions(&self) -> usize {
        self.sessions.available_permits()
    }
}

#[async_trait]
impl GraphConnector for Neo4jConnector {
    async fn session(&self) -> StoreResult<Box<dyn GraphSession>> {
        let permit = Arc::clone(&self.sessions)
            .acquire_owned()
            .await
            .map_err(|_| StoreError::SessionsExhausted)?;

        Ok(Box::new(Neo4jSession {
            client: self.client.clone(),
            commit_url: self.commit_url.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            _permit: permit,
        }))
    }
}

/// A session bound to one connector permit
pub struct Neo4jSession {
    client: Client,
    commit_url: String,
    user: String,
    password: String,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl GraphSession for Neo4jSession {
    async fn run(&mut self, query: &str, params: &Params) -> StoreResult<Vec<Record>> {
        debug!("Running Cypher against {}: {}", self.commit_url, query);

        let body = TxRequest {
            statements: vec![Statement {
                statement: query,
                parameters: params,
            }],
        };

        let resp = self
            .client
            .post(&self.commit_url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StoreError::Timeout
                } else {
                    StoreError::Connection(e.to_string())
                }
            })?;

        let status = resp.status();
        if status.is_server_error() || status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(StoreError::Connection(format!("Neo4j returned {}", status)));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        decode_response(&text)
    }
}

fn commit_url(uri: &str, database: &str) -> String {
    format!("{}/db/{}/tx/commit", uri.trim_end_matches('/'), database)
}

#[derive(Serialize)]
struct TxRequest<'a> {
    statements: Vec<Statement<'a>>,
}

#[derive(Serialize)]
struct Statement<'a> {
    statement: &'a str,
    parameters: &'a Params,
}

#[derive(Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Deserialize)]
struct StatementResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<DataRow>,
}

#[derive(Deserialize)]
struct DataRow {
    row: Vec<Value>,
}

#[derive(Deserialize)]
struct TxError {
    code: String,
    message: String,
}

/// Turn a transactional endpoint payload into records.
///
/// The endpoint reports Cypher failures in `errors` with a 200 status, so the
/// error list is checked before any rows are read.
fn decode_response(text: &str) -> StoreResult<Vec<Record>> {
    let parsed: TxResponse =
        serde_json::from_str(text).map_err(|e| StoreError::Decode(e.to_string()))?;

    if let Some(err) = parsed.errors.into_iter().next() {
        return Err(StoreError::Query {
            code: err.code,
            message: err.message,
        });
    }

    let result = match parsed.results.into_iter().next() {
        Some(result) => result,
        None => return Ok(Vec::new()),
    };

    let columns = result.columns;
    Ok(result
        .data
        .into_iter()
        .map(|d| Record::new(columns.clone(), d.row))
        .collect())
}
