//! Query transport abstraction
//!
//! The cluster's query protocol is a black box behind [`Connection`]: run a
//! query with parameters, get back records, close when done. [`Connector`]
//! builds connections so the registry never depends on a concrete transport.

pub mod http;
pub mod registry;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::{Credentials, TransportOptions};
use crate::errors::MonitorResult;

pub use self::http::{HttpConnection, HttpConnector};
pub use registry::ConnectionRegistry;

/// Query parameters, keyed by parameter name
pub type Params = Map<String, Value>;

/// One row of a query result
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<Vec<String>>,
    values: Vec<Value>,
}

impl Record {
    pub fn new(columns: Arc<Vec<String>>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Build a record from `(column, value)` pairs
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let (columns, values): (Vec<String>, Vec<Value>) =
            pairs.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Self {
            columns: Arc::new(columns),
            values,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == field)
            .and_then(|idx| self.values.get(idx))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// Result of one query execution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl QueryResult {
    pub fn first(&self) -> Option<&Record> {
        self.records.first()
    }
}

/// A long-lived connection to one node
#[async_trait]
pub trait Connection: Send + Sync {
    fn address(&self) -> &str;

    fn encrypted(&self) -> bool;

    async fn execute(&self, query: &str, params: &Params) -> MonitorResult<QueryResult>;

    async fn close(&self) -> MonitorResult<()>;
}

/// Factory for connections, used by the registry on first use of an address
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        address: &str,
        credentials: &Credentials,
        options: &TransportOptions,
    ) -> MonitorResult<Arc<dyn Connection>>;
}

/// Convert wire-level tagged numbers into plain JSON numbers, recursively.
///
/// The protocol tags integers as `{"Z": "<digits>"}` and floats as
/// `{"R": "<digits>"}` so that 64-bit values survive JSON; everything
/// downstream wants ordinary numbers.
pub fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(number) = tagged_number(&map) {
                    return number;
                }
            }
            Value::Object(map.into_iter().map(|(k, v)| (k, normalize(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        other => other,
    }
}

fn tagged_number(map: &Map<String, Value>) -> Option<Value> {
    let (tag, inner) = map.iter().next()?;
    let digits = inner.as_str()?;
    match tag.as_str() {
        "Z" => digits
            .parse::<i64>()
            .ok()
            .map(Value::from)
            .or_else(|| parse_float(digits)),
        "R" => parse_float(digits),
        _ => None,
    }
}

fn parse_float(digits: &str) -> Option<Value> {
    digits
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}
