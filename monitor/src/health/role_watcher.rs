use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument};

use super::FeedSettings;
use crate::cluster::{ClusterEvent, ClusterEventLog, Node, Role};
use crate::config::Credentials;
use crate::driver::ConnectionRegistry;
use crate::errors::{MonitorError, MonitorResult};
use crate::feed::{queries, DataFeed, FeedRegistry, FeedSpec, FeedState};
use crate::services::{tags, ErrorTracker};

/// Follows each node's cluster role and logs every change.
///
/// The node's stored role is written only from here.
pub struct RoleWatcher {
    feeds: Arc<FeedRegistry>,
    connections: Arc<ConnectionRegistry>,
    credentials: Credentials,
    settings: FeedSettings,
    events: Arc<ClusterEventLog>,
    tracker: ErrorTracker,
    watched: Mutex<HashSet<String>>,
}

impl RoleWatcher {
    pub fn new(
        feeds: Arc<FeedRegistry>,
        connections: Arc<ConnectionRegistry>,
        credentials: Credentials,
        settings: FeedSettings,
        events: Arc<ClusterEventLog>,
        tracker: ErrorTracker,
    ) -> Self {
        Self {
            feeds,
            connections,
            credentials,
            settings,
            events,
            tracker,
            watched: Mutex::new(HashSet::new()),
        }
    }

    /// Start following `node`. Watching the same node twice attaches nothing new.
    #[instrument(skip(self, node), fields(address = %node.address()))]
    pub async fn watch(&self, node: &Arc<Node>) -> MonitorResult<Arc<DataFeed>> {
        let connection = self
            .connections
            .get(node.address(), &self.credentials)
            .await?;

        let feed = self.feeds.get_or_create(
            FeedSpec::from_preset(&queries::CLUSTER_ROLE)
                .node(node.clone())
                .connection(connection)
                .params(queries::cluster_role_params(node.database()))
                .rate(self.settings.rate)
                .window_width(self.settings.window_width),
        )?;

        let first_watch = self
            .watched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(node.address().to_string());
        if !first_watch {
            return Ok(feed);
        }

        let watched_node = node.clone();
        let events = self.events.clone();
        feed.add_listener(Arc::new(move |state: &FeedState, _: &DataFeed| {
            let observed = state
                .data
                .as_ref()
                .and_then(|obs| obs.get("role"))
                .and_then(|v| v.as_str());
            if let Some(raw) = observed {
                apply_role_sample(&watched_node, &events, raw);
            }
        }));

        let tracker = self.tracker.clone();
        let address = node.address().to_string();
        feed.add_error_listener(Arc::new(move |err: &MonitorError, _: &DataFeed| {
            tracker.capture(err, tags([("address", address.as_str()), ("operation", "cluster_role")]));
        }));

        debug!("Watching cluster role of {}", node.address());
        Ok(feed)
    }
}

/// Compare one observed role against the node's stored role and record a change.
///
/// Role strings compare case-insensitively. Returns the event when the role changed.
/// The first known role of a node that started as UNKNOWN is stored without an event.
pub fn apply_role_sample(node: &Node, events: &ClusterEventLog, raw_role: &str) -> Option<ClusterEvent> {
    let observed = Role::parse(raw_role);
    if observed == node.role() {
        return None;
    }

    let previous = node.set_role(observed);
    if previous == Role::Unknown {
        debug!("Initial role of {} is {}", node.address(), observed);
        return None;
    }
    Some(events.record_role_change(node.address(), previous, observed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_sequence_produces_single_change() {
        let node = Node::new("n1", "core1:7474", Role::Follower);
        let events = ClusterEventLog::new();

        let changes: Vec<bool> = ["FOLLOWER", "follower", "LEADER", "Leader"]
            .iter()
            .map(|raw| apply_role_sample(&node, &events, raw).is_some())
            .collect();

        assert_eq!(changes, vec![false, false, true, false]);
        assert_eq!(events.len(), 1);
        let event = &events.events()[0];
        assert_eq!(event.old_role, Role::Follower);
        assert_eq!(event.new_role, Role::Leader);
        assert_eq!(node.role(), Role::Leader);
    }

    #[test]
    fn test_first_known_role_is_not_a_change() {
        let node = Node::new("n1", "core1:7474", Role::Unknown);
        let events = ClusterEventLog::new();

        assert!(apply_role_sample(&node, &events, "LEADER").is_none());
        assert_eq!(node.role(), Role::Leader);
        assert!(events.is_empty());

        let event = apply_role_sample(&node, &events, "FOLLOWER").unwrap();
        assert_eq!(event.old_role, Role::Leader);
        assert_eq!(events.len(), 1);
    }
}
