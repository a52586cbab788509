//! Composition root for cluster monitoring
//!
//! One [`MonitoringContext`] is built per process and handed explicitly to
//! whoever needs it (the API state, the binary). It owns the connection and
//! feed registries, the discovered roster and the current user.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::cluster::{ClusterEvent, ClusterEventLog, Node, TopologyDiscoverer};
use crate::config::{ActiveGraph, Config, EnvironmentSource};
use crate::constants::feeds;
use crate::diagnostics::DiagnosticsAggregator;
use crate::driver::{Connection, ConnectionRegistry, Connector, Params};
use crate::errors::{MonitorError, MonitorResult};
use crate::feed::{queries, DataFeed, FeedRegistry, FeedSpec};
use crate::health::{FeedSettings, HealthPinger, PingResult, RoleWatcher};
use crate::services::{tags, ErrorTracker};

/// Identity the monitor is connected as
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentUser {
    pub username: String,
    pub roles: Vec<String>,
    pub flags: Vec<String>,
}

impl CurrentUser {
    pub const UNKNOWN: &'static str = "UNKNOWN";

    pub fn unknown() -> Self {
        Self {
            username: Self::UNKNOWN.to_string(),
            roles: Vec::new(),
            flags: Vec::new(),
        }
    }

    /// Look up the connected user. Never fails: errors are reported and
    /// yield the UNKNOWN user.
    pub async fn resolve(connection: &dyn Connection, tracker: &ErrorTracker) -> Self {
        let resolved = connection
            .execute(queries::CURRENT_USER, &Params::new())
            .await
            .and_then(|result| {
                let rec = result.first().ok_or_else(|| {
                    MonitorError::Other("current user query returned no record".to_string())
                })?;
                let strings = |field: &str| -> Vec<String> {
                    rec.get(field)
                        .and_then(Value::as_array)
                        .map(|items| {
                            items
                                .iter()
                                .filter_map(|v| v.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default()
                };

                Ok(Self {
                    username: rec
                        .get("username")
                        .and_then(Value::as_str)
                        .unwrap_or(Self::UNKNOWN)
                        .to_string(),
                    // Community edition has no roles column
                    roles: strings("roles"),
                    flags: strings("flags"),
                })
            });

        match resolved {
            Ok(user) => user,
            Err(e) => {
                error!("Failed to get user info: {}", e);
                tracker.capture(
                    &e,
                    tags([("address", connection.address()), ("operation", "current_user")]),
                );
                Self::unknown()
            }
        }
    }
}

pub struct MonitoringContext {
    config: Arc<Config>,
    active: ActiveGraph,
    connections: Arc<ConnectionRegistry>,
    feeds: Arc<FeedRegistry>,
    nodes: Vec<Arc<Node>>,
    current_user: CurrentUser,
    events: Arc<ClusterEventLog>,
    pinger: Arc<HealthPinger>,
    role_watcher: RoleWatcher,
    diagnostics: DiagnosticsAggregator,
    tracker: ErrorTracker,
}

impl MonitoringContext {
    /// Resolve the active graph, connect to it, then look up the current user
    /// and discover the cluster concurrently.
    ///
    /// Fails when there is no active graph, when the seed cannot be reached,
    /// or when discovery fails for any reason other than standalone mode.
    pub async fn initialize(
        config: Arc<Config>,
        source: EnvironmentSource,
        connector: Arc<dyn Connector>,
    ) -> MonitorResult<Self> {
        let active = source.resolve().await?;
        let credentials = active.params.credentials();
        let tracker = ErrorTracker::new(config.error_webhook_url.clone());

        let connections = Arc::new(ConnectionRegistry::new(
            connector,
            config.transport_options(),
        ));
        let feeds = Arc::new(FeedRegistry::new());
        let events = Arc::new(ClusterEventLog::new());

        let pinger = Arc::new(HealthPinger::new(
            feeds.clone(),
            connections.clone(),
            credentials.clone(),
            FeedSettings::ping(&config),
            config.ping_timeout(),
            tracker.clone(),
        ));
        let role_watcher = RoleWatcher::new(
            feeds.clone(),
            connections.clone(),
            credentials.clone(),
            FeedSettings::role(&config),
            events.clone(),
            tracker.clone(),
        );
        let diagnostics = DiagnosticsAggregator::new(
            connections.clone(),
            feeds.clone(),
            credentials.clone(),
            source.host_environment().cloned(),
        );

        let seed_address = active.params.address();
        info!("Initializing monitoring context against {}", seed_address);
        let seed = connections.get(&seed_address, &credentials).await?;

        let discoverer = TopologyDiscoverer::new(
            connections.clone(),
            credentials,
            pinger.clone(),
            tracker.clone(),
        );
        let (current_user, discovered) = tokio::join!(
            CurrentUser::resolve(seed.as_ref(), &tracker),
            discoverer.discover(seed.as_ref(), &active.params),
        );

        let nodes = match discovered {
            Ok(nodes) => nodes,
            Err(e) => {
                feeds.stop_all();
                connections.close_all().await;
                return Err(e);
            }
        };

        let context = Self {
            config,
            active,
            connections,
            feeds,
            nodes,
            current_user,
            events,
            pinger,
            role_watcher,
            diagnostics,
            tracker,
        };

        if context.is_cluster() {
            for node in &context.nodes {
                if let Err(e) = context.role_watcher.watch(node).await {
                    warn!("Cannot watch cluster role of {}: {}", node.address(), e);
                    context.tracker.capture(
                        &e,
                        tags([("address", node.address()), ("operation", "cluster_role")]),
                    );
                }
            }
        }

        info!(
            "Monitoring context ready: {} node(s), user {}",
            context.nodes.len(),
            context.current_user.username
        );
        Ok(context)
    }

    /// Stop every feed and close every connection. Safe to call more than once.
    pub async fn shutdown(&self) {
        info!("Shutting down monitoring context");
        self.feeds.stop_all();
        self.connections.close_all().await;
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn active_graph(&self) -> &ActiveGraph {
        &self.active
    }

    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&Arc<Node>> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub fn current_user(&self) -> &CurrentUser {
        &self.current_user
    }

    /// More than one member
    pub fn is_cluster(&self) -> bool {
        self.nodes.len() > 1
    }

    pub fn is_enterprise(&self) -> bool {
        self.nodes.first().map(|n| n.is_enterprise()).unwrap_or(false)
    }

    pub fn supports_native_auth(&self) -> bool {
        self.nodes
            .first()
            .map(|n| n.supports_native_auth())
            .unwrap_or(false)
    }

    pub fn events(&self) -> Vec<ClusterEvent> {
        self.events.events()
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    pub fn feeds(&self) -> &Arc<FeedRegistry> {
        &self.feeds
    }

    /// Shared feed for `spec` on `node`, created with the node's connection.
    ///
    /// The configured poll interval and window width apply unless the FeedSpec
    /// already differs from the built-in defaults.
    pub async fn data_feed(&self, node: &Arc<Node>, spec: FeedSpec) -> MonitorResult<Arc<DataFeed>> {
        let connection = self
            .connections
            .get(node.address(), &self.active.params.credentials())
            .await?;

        let mut spec = spec.node(node.clone()).connection(connection);
        if spec.rate == feeds::DEFAULT_POLL_INTERVAL {
            spec = spec.rate(self.config.poll_interval());
        }
        if spec.window_width == feeds::DEFAULT_WINDOW_WIDTH {
            spec = spec.window_width(self.config.window_width());
        }
        self.feeds.get_or_create(spec)
    }

    pub fn feeds_for(&self, node: &Node) -> Vec<Arc<DataFeed>> {
        self.feeds.feeds_for(node.address())
    }

    pub fn tracker(&self) -> &ErrorTracker {
        &self.tracker
    }

    pub async fn ping(&self, node: &Arc<Node>) -> MonitorResult<PingResult> {
        self.pinger.ping(node).await
    }

    /// Last-known ping round-trip of `node`
    pub fn latency_ms(&self, node: &Arc<Node>) -> Option<u64> {
        self.pinger.latency_ms(node)
    }

    pub async fn report(&self) -> Value {
        self.diagnostics.report(&self.nodes, &self.active).await
    }
}
