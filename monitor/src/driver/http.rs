//! HTTP transport for the cluster's transactional query endpoint

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::{normalize, Connection, Connector, Params, QueryResult, Record};
use crate::config::{Credentials, TransportOptions, TrustPolicy};
use crate::errors::{MonitorError, MonitorResult, QueryError};

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}

/// Builds [`HttpConnection`]s
#[derive(Debug, Clone, Default)]
pub struct HttpConnector;

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(
        &self,
        address: &str,
        credentials: &Credentials,
        options: &TransportOptions,
    ) -> MonitorResult<Arc<dyn Connection>> {
        let connection = HttpConnection::new(address, credentials, options)?;
        Ok(Arc::new(connection))
    }
}

pub struct HttpConnection {
    address: String,
    endpoint: String,
    username: String,
    password: String,
    encrypted: bool,
    client: HttpClient,
    closed: AtomicBool,
}

impl HttpConnection {
    pub fn new(
        address: &str,
        credentials: &Credentials,
        options: &TransportOptions,
    ) -> MonitorResult<Self> {
        let client = HttpClient::builder()
            .connect_timeout(options.connection_timeout)
            .timeout(options.connection_timeout)
            .danger_accept_invalid_certs(options.trust == TrustPolicy::TrustAll)
            .build()
            .map_err(|e| MonitorError::connectivity(address, e))?;

        let scheme = if credentials.encrypted { "https" } else { "http" };
        let endpoint = format!(
            "{}://{}/db/{}/tx/commit",
            scheme, address, credentials.database
        );
        debug!("HTTP connection for {} -> {}", address, endpoint);

        Ok(Self {
            address: address.to_string(),
            endpoint,
            username: credentials.username.clone(),
            password: credentials.password.clone(),
            encrypted: credentials.encrypted,
            client,
            closed: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Connection for HttpConnection {
    fn address(&self) -> &str {
        &self.address
    }

    fn encrypted(&self) -> bool {
        self.encrypted
    }

    async fn execute(&self, query: &str, params: &Params) -> MonitorResult<QueryResult> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MonitorError::connectivity(&self.address, "connection closed"));
        }

        let request_body = json!({
            "statements": [{ "statement": query, "parameters": params }]
        });

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| MonitorError::connectivity(&self.address, e))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(MonitorError::connectivity(
                &self.address,
                format!(
                    "HTTP error {}: {}",
                    status,
                    response.text().await.unwrap_or_default()
                ),
            ));
        }

        let tx: TxResponse = response
            .json()
            .await
            .map_err(|e| MonitorError::connectivity(&self.address, format!("invalid response: {}", e)))?;

        if let Some(error) = tx.errors.into_iter().next() {
            return Err(QueryError {
                address: self.address.clone(),
                query: query.to_string(),
                code: error.code,
                message: error.message,
            }
            .into());
        }

        let Some(result) = tx.results.into_iter().next() else {
            return Ok(QueryResult::default());
        };

        let columns = Arc::new(result.columns);
        let records = result
            .data
            .into_iter()
            .map(|row| Record::new(columns.clone(), row.row.into_iter().map(normalize).collect()))
            .collect();

        Ok(QueryResult {
            columns: columns.as_ref().clone(),
            records,
        })
    }

    async fn close(&self) -> MonitorResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("Closed connection to {}", self.address);
        }
        Ok(())
    }
}
