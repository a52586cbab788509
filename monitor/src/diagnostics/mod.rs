//! On-demand diagnostics across the whole cluster
//!
//! A report has three parts gathered concurrently: one object per node with
//! its basics and every probe category, monitor-wide metadata, and the host
//! environment context. The finished report is redacted before it is
//! returned; nothing is cached between requests.

pub mod probes;
pub mod redact;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::cluster::Node;
use crate::config::{ActiveGraph, Credentials, HostEnvironment};
use crate::constants::diagnostics::HOST_ENVIRONMENT_MISSING;
use crate::driver::registry::ConnectionInfo;
use crate::driver::ConnectionRegistry;
use crate::feed::{FeedRegistry, FeedStats};

pub use probes::{Probe, PROBES};
pub use redact::{redact, redacted};

/// Monitor-wide part of a diagnostics report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorMetadata {
    pub name: &'static str,
    pub version: &'static str,
    pub diagnostics_generated: DateTime<Utc>,
    pub connections: Vec<ConnectionInfo>,
    pub active_project: Value,
    pub active_graph: Value,
    pub data_feeds: Vec<FeedStats>,
}

pub struct DiagnosticsAggregator {
    connections: Arc<ConnectionRegistry>,
    feeds: Arc<FeedRegistry>,
    credentials: Credentials,
    host: Option<Arc<dyn HostEnvironment>>,
}

impl DiagnosticsAggregator {
    pub fn new(
        connections: Arc<ConnectionRegistry>,
        feeds: Arc<FeedRegistry>,
        credentials: Credentials,
        host: Option<Arc<dyn HostEnvironment>>,
    ) -> Self {
        Self {
            connections,
            feeds,
            credentials,
            host,
        }
    }

    /// Build a fresh, redacted report. Probe failures appear inline as values.
    #[instrument(skip_all, fields(nodes = nodes.len()))]
    pub async fn report(&self, nodes: &[Arc<Node>], active: &ActiveGraph) -> Value {
        let (node_reports, metadata, host_environment) = tokio::join!(
            join_all(nodes.iter().map(|node| self.node_diagnostics(node))),
            self.monitor_metadata(active),
            self.host_environment(),
        );

        let mut report = json!({
            "monitor": metadata,
            "nodes": node_reports,
            "hostEnvironment": host_environment,
        });
        redact(&mut report);

        info!("Generated diagnostics for {} node(s)", nodes.len());
        report
    }

    async fn node_diagnostics(&self, node: &Arc<Node>) -> Value {
        let mut diagnostics = Map::new();
        diagnostics.insert("basics".to_string(), node.as_json());

        let categories = match self
            .connections
            .get(node.address(), &self.credentials)
            .await
        {
            Ok(connection) => probes::run_all(connection.as_ref()).await,
            Err(e) => {
                warn!("Diagnostics cannot reach {}: {}", node.address(), e);
                probes::all_failed(&e)
            }
        };
        diagnostics.extend(categories);
        Value::Object(diagnostics)
    }

    async fn monitor_metadata(&self, active: &ActiveGraph) -> Value {
        let metadata = MonitorMetadata {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            diagnostics_generated: Utc::now(),
            connections: self.connections.describe().await,
            active_project: redacted(&active.project),
            active_graph: redacted(&active.graph),
            data_feeds: self.feeds.all().iter().map(|feed| feed.stats()).collect(),
        };
        serde_json::to_value(metadata).unwrap_or_else(|e| json!({ "error": e.to_string() }))
    }

    async fn host_environment(&self) -> Value {
        match &self.host {
            Some(host) => match host.context().await {
                Ok(context) => redacted(&context),
                Err(e) => json!({ "error": e.to_string() }),
            },
            None => Value::from(HOST_ENVIRONMENT_MISSING),
        }
    }
}
