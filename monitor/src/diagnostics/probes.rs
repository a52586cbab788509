//! The fixed battery of per-node introspection probes
//!
//! Every probe contributes exactly one top-level category to the node's
//! diagnostics. A failed probe contributes `{"error": "<message>"}` under its
//! category instead of disappearing.

use futures::future::join_all;
use serde_json::{json, Map, Value};

use crate::driver::{Connection, Params, QueryResult, Record};
use crate::errors::{MonitorError, MonitorResult};
use crate::feed::queries::diagnostics as q;

pub struct Probe {
    pub category: &'static str,
    pub query: &'static str,
    format: fn(&QueryResult) -> MonitorResult<Value>,
}

pub const PROBES: [Probe; 9] = [
    Probe { category: "users", query: q::LIST_USERS, format: users },
    Probe { category: "roles", query: q::LIST_ROLES, format: roles },
    Probe { category: "indexes", query: q::LIST_INDEXES, format: indexes },
    Probe { category: "constraints", query: q::LIST_CONSTRAINTS, format: constraints },
    Probe { category: "JMX", query: q::QUERY_JMX, format: jmx },
    Probe { category: "configuration", query: q::LIST_CONFIG, format: configuration },
    Probe { category: "apoc", query: q::APOC_VERSION, format: apoc },
    Probe { category: "nodes", query: q::NODE_COUNT, format: node_count },
    Probe { category: "schema", query: q::LABELS, format: labels },
];

pub fn error_value(err: &MonitorError) -> Value {
    json!({ "error": err.to_string() })
}

/// Run every probe concurrently, returning one entry per category
pub async fn run_all(connection: &dyn Connection) -> Map<String, Value> {
    let results = join_all(PROBES.iter().map(|probe| async move {
        let value = match connection.execute(probe.query, &Params::new()).await {
            Ok(result) => (probe.format)(&result).unwrap_or_else(|e| error_value(&e)),
            Err(e) => error_value(&e),
        };
        (probe.category.to_string(), value)
    }))
    .await;

    results.into_iter().collect()
}

/// Every category filled with the same error, for a node that cannot be reached
pub fn all_failed(err: &MonitorError) -> Map<String, Value> {
    PROBES
        .iter()
        .map(|probe| (probe.category.to_string(), error_value(err)))
        .collect()
}

fn field(rec: &Record, name: &str) -> Value {
    rec.get(name).cloned().unwrap_or(Value::Null)
}

fn rows(result: &QueryResult, fields: &[&str]) -> Value {
    Value::Array(
        result
            .records
            .iter()
            .map(|rec| {
                Value::Object(
                    fields
                        .iter()
                        .map(|f| (f.to_string(), field(rec, f)))
                        .collect(),
                )
            })
            .collect(),
    )
}

fn users(result: &QueryResult) -> MonitorResult<Value> {
    Ok(rows(result, &["username", "flags", "roles"]))
}

fn roles(result: &QueryResult) -> MonitorResult<Value> {
    Ok(rows(result, &["role", "users"]))
}

// Index signatures differ between server versions (label vs tokenNames);
// absent fields come back as null.
fn indexes(result: &QueryResult) -> MonitorResult<Value> {
    Ok(rows(
        result,
        &["description", "label", "tokenNames", "properties", "state", "type", "provider"],
    ))
}

fn constraints(result: &QueryResult) -> MonitorResult<Value> {
    Ok(Value::Array(
        result
            .records
            .iter()
            .enumerate()
            .map(|(idx, rec)| json!({ "idx": idx, "description": field(rec, "description") }))
            .collect(),
    ))
}

fn jmx(result: &QueryResult) -> MonitorResult<Value> {
    Ok(rows(result, &["name", "attributes"]))
}

/// Configuration keys can repeat; repeated values are collected into a list in order
fn configuration(result: &QueryResult) -> MonitorResult<Value> {
    let mut config = Map::new();
    for rec in &result.records {
        let key = match rec.get("name").and_then(Value::as_str) {
            Some(key) => key.to_string(),
            None => continue,
        };
        let value = field(rec, "value");

        match config.get_mut(&key) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                config.insert(key, value);
            }
        }
    }
    Ok(Value::Object(config))
}

fn single_value(result: &QueryResult, key: &str) -> MonitorResult<Value> {
    let value = result
        .first()
        .and_then(|rec| rec.get("value"))
        .cloned()
        .ok_or_else(|| MonitorError::Other("probe returned no value".to_string()))?;
    let mut nested = Map::new();
    nested.insert(key.to_string(), value);
    Ok(Value::Object(nested))
}

fn apoc(result: &QueryResult) -> MonitorResult<Value> {
    single_value(result, "version")
}

fn node_count(result: &QueryResult) -> MonitorResult<Value> {
    single_value(result, "count")
}

fn labels(result: &QueryResult) -> MonitorResult<Value> {
    single_value(result, "labels")
}
