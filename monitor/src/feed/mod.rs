//! Recurring sampled queries ("feeds")
//!
//! A [`DataFeed`] runs one query against one node on a fixed cadence, keeps a
//! bounded window of timestamped observations and notifies listeners. The
//! [`FeedRegistry`] makes sure that consumers asking for the same node, query
//! and parameters share a single poll loop.

pub mod data_feed;
pub mod queries;
pub mod registry;
pub mod window;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cluster::Node;
use crate::constants::feeds;
use crate::driver::{Connection, Params};
use crate::errors::MonitorError;

pub use data_feed::{DataFeed, DataListener, ErrorListener, ListenerId};
pub use queries::FeedQuery;
pub use registry::FeedRegistry;
pub use window::Window;

/// Identity of a feed: two specs with the same key share one poll loop
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FeedKey {
    pub address: String,
    pub query: String,
    pub params: String,
}

/// Everything needed to build a feed
#[derive(Clone)]
pub struct FeedSpec {
    pub node: Option<Arc<Node>>,
    pub connection: Option<Arc<dyn Connection>>,
    pub query: String,
    pub params: Params,
    pub rate: Duration,
    pub columns: Vec<String>,
    pub window_width: Duration,
}

impl FeedSpec {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            node: None,
            connection: None,
            query: query.into(),
            params: Params::new(),
            rate: feeds::DEFAULT_POLL_INTERVAL,
            columns: Vec::new(),
            window_width: feeds::DEFAULT_WINDOW_WIDTH,
        }
    }

    /// Spec from a query preset
    pub fn from_preset(preset: &FeedQuery) -> Self {
        Self::new(preset.query)
            .columns(preset.columns.iter().copied())
            .rate(preset.rate)
    }

    pub fn node(mut self, node: Arc<Node>) -> Self {
        self.node = Some(node);
        self
    }

    pub fn connection(mut self, connection: Arc<dyn Connection>) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn rate(mut self, rate: Duration) -> Self {
        self.rate = rate;
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn window_width(mut self, window_width: Duration) -> Self {
        self.window_width = window_width;
        self
    }

    /// Key for deduplication; `None` until a node is set
    pub fn key(&self) -> Option<FeedKey> {
        self.node.as_ref().map(|node| FeedKey {
            address: node.address().to_string(),
            query: self.query.clone(),
            // Params is an ordered map, so its JSON text is canonical
            params: Value::Object(self.params.clone()).to_string(),
        })
    }
}

/// One timestamped sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<String, Value>,
}

impl Observation {
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        Self {
            timestamp: Utc::now(),
            values,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Numeric values of this observation, non-numeric fields skipped
    pub fn numbers(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.values().filter_map(Value::as_f64)
    }
}

/// Snapshot of a feed handed to listeners and to `current_state`
#[derive(Debug, Clone)]
pub struct FeedState {
    pub data: Option<Arc<Observation>>,
    pub events: Window<Arc<Observation>>,
    pub time: DateTime<Utc>,
    pub last_data_arrived: Option<DateTime<Utc>>,
    pub last_error: Option<MonitorError>,
}

impl FeedState {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: None,
            events: Window::with_capacity(capacity),
            time: Utc::now(),
            last_data_arrived: None,
            last_error: None,
        }
    }

    /// True until the first successful sample
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Result of a single poll, as broadcast to one-shot waiters
#[derive(Debug, Clone)]
pub enum FeedOutcome {
    Data(Arc<Observation>),
    Error(MonitorError),
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedStats {
    pub name: String,
    pub address: String,
    pub query: String,
    pub rate_ms: u64,
    pub running: bool,
    pub samples: u64,
    pub errors: u64,
    pub last_elapsed_ms: u64,
    pub window_len: usize,
    pub window_capacity: usize,
    pub listeners: usize,
    pub last_data_arrived: Option<DateTime<Utc>>,
}
