use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout;
use tracing::{debug, instrument};

use super::FeedSettings;
use crate::cluster::Node;
use crate::config::Credentials;
use crate::driver::ConnectionRegistry;
use crate::errors::{MonitorError, MonitorResult};
use crate::feed::{queries, DataFeed, FeedOutcome, FeedRegistry, FeedSpec};
use crate::services::{tags, ErrorTracker};

#[derive(Debug, Clone, Serialize)]
pub struct PingResult {
    pub id: String,
    pub address: String,
    /// Duration of the poll that answered this ping
    pub elapsed_ms: u64,
}

/// Liveness checks that ride on an always-running ping feed per node.
///
/// A ping never issues its own query: it waits for the next outcome of the
/// node's ping feed, creating and starting that feed on first use.
pub struct HealthPinger {
    feeds: Arc<FeedRegistry>,
    connections: Arc<ConnectionRegistry>,
    credentials: Credentials,
    settings: FeedSettings,
    timeout: Duration,
    tracker: ErrorTracker,
}

impl HealthPinger {
    pub fn new(
        feeds: Arc<FeedRegistry>,
        connections: Arc<ConnectionRegistry>,
        credentials: Credentials,
        settings: FeedSettings,
        timeout: Duration,
        tracker: ErrorTracker,
    ) -> Self {
        Self {
            feeds,
            connections,
            credentials,
            settings,
            timeout,
            tracker,
        }
    }

    /// Resolve on the next successful ping sample, fail on the next ping error.
    ///
    /// The node is marked reachable or unreachable accordingly; failures are
    /// also reported to the error tracker.
    #[instrument(skip(self, node), fields(address = %node.address()))]
    pub async fn ping(&self, node: &Arc<Node>) -> MonitorResult<PingResult> {
        match self.await_next_sample(node).await {
            Ok(feed) => {
                node.set_reachable(true);
                let result = PingResult {
                    id: node.id().to_string(),
                    address: node.address().to_string(),
                    elapsed_ms: feed.last_elapsed_ms(),
                };
                debug!("Ping {} answered in {}ms", result.address, result.elapsed_ms);
                Ok(result)
            }
            Err(e) => {
                node.set_reachable(false);
                self.tracker
                    .capture(&e, tags([("address", node.address()), ("operation", "ping")]));
                Err(e)
            }
        }
    }

    /// Ping feed for `node`, creating it if needed
    pub async fn feed_for(&self, node: &Arc<Node>) -> MonitorResult<Arc<DataFeed>> {
        let connection = self
            .connections
            .get(node.address(), &self.credentials)
            .await?;

        self.feeds.get_or_create(
            FeedSpec::from_preset(&queries::PING)
                .node(node.clone())
                .connection(connection)
                .rate(self.settings.rate)
                .window_width(self.settings.window_width),
        )
    }

    /// Round-trip time of the latest ping poll, if the node has a ping feed
    pub fn latency_ms(&self, node: &Arc<Node>) -> Option<u64> {
        let key = FeedSpec::from_preset(&queries::PING)
            .node(node.clone())
            .key()?;
        self.feeds.get(&key).map(|feed| feed.last_elapsed_ms())
    }

    async fn await_next_sample(&self, node: &Arc<Node>) -> MonitorResult<Arc<DataFeed>> {
        let feed = self.feed_for(node).await?;
        let mut outcomes = feed.subscribe();

        let next = async {
            loop {
                match outcomes.recv().await {
                    Ok(FeedOutcome::Data(_)) => return Ok(()),
                    Ok(FeedOutcome::Error(e)) => return Err(e),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => {
                        return Err(MonitorError::feed(feed.name(), "ping feed closed"))
                    }
                }
            }
        };

        match timeout(self.timeout, next).await {
            Ok(Ok(())) => Ok(feed),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(MonitorError::connectivity(
                node.address(),
                format!("no ping answer within {}s", self.timeout.as_secs()),
            )),
        }
    }
}
