//! Graph store access over the Neo4j HTTP transaction API.
//!
//! Every statement runs in its own auto-commit transaction via
//! `POST {uri}/db/{database}/tx/commit`. The store holds no session state,
//! so concurrent writers coordinate through the data itself (idempotent
//! MERGE patterns and flag-gated work queues) rather than locks.

pub mod rows;
pub mod schema;

pub use rows::RowSet;

use async_trait::async_trait;
use magpie_types::config::GraphProfile;
use magpie_types::error::{GraphError, GraphResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Timeout for graph store requests. Statement latency is bounded by the
/// store itself; anything slower than this indicates an unreachable host.
const GRAPH_TIMEOUT_SECS: u64 = 10;

/// Transport executing a single Cypher statement against one database.
#[async_trait]
pub trait GraphTransport: Send + Sync {
    /// Run the statement with its parameters and decode the tabular result.
    async fn execute(&self, statement: &str, parameters: Value) -> GraphResult<RowSet>;
}

/// Handle to one graph database.
///
/// Cheap to clone and free of mutable state. Pointing at a different
/// database means connecting a new store from another profile value,
/// never reconfiguring an existing handle.
#[derive(Clone)]
pub struct GraphStore {
    transport: Arc<dyn GraphTransport>,
}

impl GraphStore {
    /// Connect to the database described by a profile.
    pub fn connect(profile: &GraphProfile) -> GraphResult<Self> {
        let transport = HttpTransport::new(profile)?;
        Ok(Self {
            transport: Arc::new(transport),
        })
    }

    /// Build a store over an arbitrary transport.
    pub fn with_transport(transport: Arc<dyn GraphTransport>) -> Self {
        Self { transport }
    }

    /// Run one statement in an auto-commit transaction.
    pub async fn run(&self, statement: &str, parameters: &Value) -> GraphResult<RowSet> {
        self.transport.execute(statement, parameters.clone()).await
    }
}

#[derive(Serialize)]
struct TxRequest<'a> {
    statements: Vec<TxStatement<'a>>,
}

#[derive(Serialize)]
struct TxStatement<'a> {
    statement: &'a str,
    parameters: Value,
}

#[derive(Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Deserialize)]
struct TxResult {
    columns: Vec<String>,
    data: Vec<TxRow>,
}

#[derive(Deserialize)]
struct TxRow {
    row: Vec<Value>,
}

#[derive(Deserialize)]
struct TxError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// HTTP transport speaking the transaction-commit endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    user: String,
    password: String,
}

impl HttpTransport {
    /// Build a transport for one profile. Fails only if the HTTP client
    /// itself cannot be constructed.
    pub fn new(profile: &GraphProfile) -> GraphResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(GRAPH_TIMEOUT_SECS))
            .build()
            .map_err(|e| GraphError::Http(e.to_string()))?;
        let base = profile.uri.trim_end_matches('/');
        let endpoint = format!("{}/db/{}/tx/commit", base, profile.database);
        Ok(Self {
            client,
            endpoint,
            user: profile.user.clone(),
            password: profile.password.clone(),
        })
    }
}

#[async_trait]
impl GraphTransport for HttpTransport {
    async fn execute(&self, statement: &str, parameters: Value) -> GraphResult<RowSet> {
        let body = TxRequest {
            statements: vec![TxStatement {
                statement,
                parameters,
            }],
        };

        let mut req = self.client.post(&self.endpoint).json(&body);
        if !self.user.is_empty() {
            req = req.basic_auth(&self.user, Some(&self.password));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| GraphError::Http(e.to_string()))?;
        let status = resp.status().as_u16();

        if !(200..300).contains(&status) {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(GraphError::Api {
                status,
                message: body_text,
            });
        }

        let body: TxResponse = resp
            .json()
            .await
            .map_err(|e| GraphError::Parse(e.to_string()))?;

        debug!(
            results = body.results.len(),
            errors = body.errors.len(),
            "Statement executed"
        );

        decode_tx_response(body)
    }
}

/// Decode a transaction response, surfacing server-side statement errors.
///
/// A commit response can be HTTP 200 and still carry errors; any entry in
/// `errors` means the statement was rolled back and must be treated as a
/// hard failure.
fn decode_tx_response(body: TxResponse) -> GraphResult<RowSet> {
    if let Some(error) = body.errors.into_iter().next() {
        return Err(GraphError::Query {
            code: error.code,
            message: error.message,
        });
    }

    let Some(result) = body.results.into_iter().next() else {
        return Ok(RowSet::default());
    };

    let mut rows = RowSet::new(result.columns);
    for entry in result.data {
        rows.push_row(entry.row);
    }
    Ok(rows)
}
