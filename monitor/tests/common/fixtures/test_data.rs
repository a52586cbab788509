//! Common test data and constants

use monitor::config::{ActiveGraph, Config};
use monitor::driver::{QueryResult, Record};
use monitor::errors::{MonitorError, QueryError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Common member addresses
pub mod addresses {
    pub const CORE_1: &str = "core1:7474";
    pub const CORE_2: &str = "core2:7474";
    pub const CORE_3: &str = "core3:7474";
    pub const STANDALONE: &str = "localhost:7474";
}

/// Error codes the cluster reports
pub mod codes {
    pub const PROCEDURE_NOT_FOUND: &str = "Neo.ClientError.Procedure.ProcedureNotFound";
    pub const UNAUTHORIZED: &str = "Neo.ClientError.Security.Unauthorized";
    pub const GENERAL_FAILURE: &str = "Neo.DatabaseError.General.UnknownError";
}

pub const TEST_PASSWORD: &str = "s3cret-test-password";

/// Query result with the given columns and rows
pub fn result(columns: &[&str], rows: Vec<Vec<Value>>) -> QueryResult {
    let columns: Arc<Vec<String>> = Arc::new(columns.iter().map(|c| c.to_string()).collect());
    QueryResult {
        columns: columns.to_vec(),
        records: rows
            .into_iter()
            .map(|values| Record::new(columns.clone(), values))
            .collect(),
    }
}

pub fn query_error(address: &str, query: &str, code: &str, message: &str) -> MonitorError {
    MonitorError::QueryExecution(QueryError {
        address: address.to_string(),
        query: query.to_string(),
        code: code.to_string(),
        message: message.to_string(),
    })
}

/// Active graph pointing at `host:port`, built the same way environment mode builds it
pub fn active_graph(host: &str, port: u16) -> ActiveGraph {
    let vars: HashMap<&str, String> = HashMap::from([
        ("NEO4J_HOST", host.to_string()),
        ("NEO4J_PORT", port.to_string()),
        ("NEO4J_USERNAME", "neo4j".to_string()),
        ("NEO4J_PASSWORD", TEST_PASSWORD.to_string()),
        ("GRAPH_NAME", "test-graph".to_string()),
    ]);
    ActiveGraph::from_vars(|key| vars.get(key).cloned())
}

/// Config with short intervals for paused-clock tests
pub fn fast_config() -> Arc<Config> {
    Arc::new(Config {
        poll_interval_ms: 100,
        ping_interval_ms: 100,
        role_interval_ms: 500,
        ping_timeout_seconds: 5,
        window_width_seconds: 10,
        ..Config::default()
    })
}

pub const SETTLE: Duration = Duration::from_millis(50);
