//! Self-rescheduling recurring query
//!
//! Each feed owns its schedule. A poll runs the query, records the outcome and
//! only then arms the timer for the next poll, so there is never more than one
//! query in flight per feed and feeds never run in lockstep with each other.
//!
//! `stop()` cancels the pending timer. A poll that has already started is left
//! to finish and deliver its result; it will not arm another timer.

use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::window::capacity_for;
use super::{FeedKey, FeedOutcome, FeedSpec, FeedState, FeedStats, Observation};
use crate::cluster::Node;
use crate::constants::feeds::OUTCOME_CHANNEL_CAPACITY;
use crate::driver::{normalize, Connection, Params, QueryResult};
use crate::errors::{MonitorError, MonitorResult};

/// Called with the feed snapshot after every successful sample
pub type DataListener = Arc<dyn Fn(&FeedState, &DataFeed) + Send + Sync>;

/// Called with the error after every failed poll
pub type ErrorListener = Arc<dyn Fn(&MonitorError, &DataFeed) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Schedule {
    running: bool,
    // Bumped by start/stop; a poll from an older generation never re-arms
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

pub struct DataFeed {
    name: String,
    key: FeedKey,
    node: Arc<Node>,
    connection: Arc<dyn Connection>,
    query: String,
    params: Params,
    rate: Duration,
    columns: Vec<String>,
    window_width: Duration,
    state: RwLock<FeedState>,
    listeners: RwLock<Vec<(ListenerId, DataListener)>>,
    error_listeners: RwLock<Vec<(ListenerId, ErrorListener)>>,
    next_listener_id: AtomicU64,
    outcomes: broadcast::Sender<FeedOutcome>,
    schedule: Mutex<Schedule>,
    poll_gate: tokio::sync::Mutex<()>,
    samples: AtomicU64,
    errors: AtomicU64,
    last_elapsed_ms: AtomicU64,
}

impl DataFeed {
    /// Build an idle feed. Fails when node, connection, query or columns are missing.
    pub fn new(spec: FeedSpec) -> MonitorResult<Self> {
        let key = spec.key();
        let (node, connection, key) = match (spec.node, spec.connection, key) {
            (Some(node), Some(connection), Some(key))
                if !spec.query.trim().is_empty() && !spec.columns.is_empty() =>
            {
                (node, connection, key)
            }
            _ => {
                return Err(MonitorError::feed(
                    spec.query,
                    "missing one of required node, connection, query, columns",
                ))
            }
        };

        let name = format!("{}-{}", node.address(), spec.query);
        let capacity = capacity_for(spec.window_width, spec.rate);
        let (outcomes, _) = broadcast::channel(OUTCOME_CHANNEL_CAPACITY);

        Ok(Self {
            name,
            key,
            node,
            connection,
            query: spec.query,
            params: spec.params,
            rate: spec.rate,
            columns: spec.columns,
            window_width: spec.window_width,
            state: RwLock::new(FeedState::new(capacity)),
            listeners: RwLock::new(Vec::new()),
            error_listeners: RwLock::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            outcomes,
            schedule: Mutex::new(Schedule::default()),
            poll_gate: tokio::sync::Mutex::new(()),
            samples: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            last_elapsed_ms: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &FeedKey {
        &self.key
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn rate(&self) -> Duration {
        self.rate
    }

    pub fn window_width(&self) -> Duration {
        self.window_width
    }

    /// Wall-clock duration of the most recent poll
    pub fn last_elapsed_ms(&self) -> u64 {
        self.last_elapsed_ms.load(Ordering::Acquire)
    }

    pub fn current_state(&self) -> FeedState {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock_schedule().running
    }

    pub fn add_listener(&self, listener: DataListener) -> ListenerId {
        let id = self.next_id();
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, listener));
        id
    }

    pub fn add_error_listener(&self, listener: ErrorListener) -> ListenerId {
        let id = self.next_id();
        self.error_listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut removed = false;
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(lid, _)| {
                let keep = *lid != id;
                removed |= !keep;
                keep
            });
        self.error_listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(lid, _)| {
                let keep = *lid != id;
                removed |= !keep;
                keep
            });
        removed
    }

    /// Receiver for the outcome of every poll from now on
    pub fn subscribe(&self) -> broadcast::Receiver<FeedOutcome> {
        self.outcomes.subscribe()
    }

    /// Smallest numeric value across every observation in the window, 0 when empty
    pub fn min(&self) -> f64 {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .events
            .iter()
            .flat_map(|obs| obs.numbers())
            .reduce(f64::min)
            .unwrap_or(0.0)
    }

    /// Largest numeric value across every observation in the window, 1 when empty
    pub fn max(&self) -> f64 {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .events
            .iter()
            .flat_map(|obs| obs.numbers())
            .reduce(f64::max)
            .unwrap_or(1.0)
    }

    pub fn stats(&self) -> FeedStats {
        let (window_len, window_capacity, last_data_arrived) = {
            let state = self.state.read().unwrap_or_else(|e| e.into_inner());
            (
                state.events.len(),
                state.events.capacity(),
                state.last_data_arrived,
            )
        };
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner()).len()
            + self
                .error_listeners
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .len();

        FeedStats {
            name: self.name.clone(),
            address: self.node.address().to_string(),
            query: self.query.clone(),
            rate_ms: self.rate.as_millis() as u64,
            running: self.is_running(),
            samples: self.samples.load(Ordering::Acquire),
            errors: self.errors.load(Ordering::Acquire),
            last_elapsed_ms: self.last_elapsed_ms(),
            window_len,
            window_capacity,
            listeners,
            last_data_arrived,
        }
    }

    /// Cancel any pending timer and poll immediately
    pub fn start(self: &Arc<Self>) {
        let mut schedule = self.lock_schedule();
        schedule.generation += 1;
        schedule.running = true;
        if let Some(pending) = schedule.pending.take() {
            pending.abort();
        }

        let generation = schedule.generation;
        let feed = Arc::clone(self);
        tokio::spawn(async move { feed.poll(generation).await });
        debug!("Started feed {}", self.name);
    }

    /// Cancel the pending timer. An in-flight poll still completes. Idempotent.
    pub fn stop(&self) {
        let mut schedule = self.lock_schedule();
        if schedule.running {
            debug!("Stopping feed {}", self.name);
        }
        schedule.running = false;
        schedule.generation += 1;
        if let Some(pending) = schedule.pending.take() {
            pending.abort();
        }
    }

    async fn poll(self: Arc<Self>, generation: u64) {
        // Failures are absorbed by sample(); the cadence continues either way
        let _ = self.sample().await;
        self.schedule_next(generation);
    }

    fn schedule_next(self: &Arc<Self>, generation: u64) {
        let mut schedule = self.lock_schedule();
        if !schedule.running || schedule.generation != generation {
            return;
        }

        let feed = Arc::clone(self);
        let rate = self.rate;
        schedule.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(rate).await;

            // Spawn under the schedule lock so stop() either cancels us here or
            // sees the poll as already in flight
            let schedule = feed.lock_schedule();
            if schedule.running && schedule.generation == generation {
                let next = Arc::clone(&feed);
                tokio::spawn(async move { next.poll(generation).await });
            }
        }));
    }

    /// Run the query once, record the outcome and notify everyone.
    ///
    /// Used by the poll loop; callable directly for a one-off sample.
    pub async fn sample(&self) -> MonitorResult<Arc<Observation>> {
        let _gate = self.poll_gate.lock().await;

        let started = Instant::now();
        let result = self.connection.execute(&self.query, &self.params).await;
        let elapsed = started.elapsed();
        self.last_elapsed_ms
            .store(elapsed.as_millis() as u64, Ordering::Release);

        if elapsed > self.rate {
            warn!(
                "Feed query is taking {}ms against a {}ms interval on {}; consider a longer interval",
                elapsed.as_millis(),
                self.rate.as_millis(),
                self.node.address()
            );
        }

        match result.and_then(|r| self.extract(&r)) {
            Ok(values) => {
                let observation = Arc::new(Observation::new(values));
                let snapshot = {
                    let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
                    state.events.push(observation.clone());
                    state.data = Some(observation.clone());
                    state.time = observation.timestamp;
                    state.last_data_arrived = Some(Utc::now());
                    state.last_error = None;
                    state.clone()
                };
                self.samples.fetch_add(1, Ordering::AcqRel);

                self.notify_data(&snapshot);
                let _ = self.outcomes.send(FeedOutcome::Data(observation.clone()));
                Ok(observation)
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::AcqRel);
                self.state
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .last_error = Some(e.clone());
                warn!("Failed to execute feed query {}: {}", self.name, e);

                self.notify_error(&e);
                let _ = self.outcomes.send(FeedOutcome::Error(e.clone()));
                Err(e)
            }
        }
    }

    /// Configured fields of the first record; further records are ignored
    fn extract(&self, result: &QueryResult) -> MonitorResult<BTreeMap<String, Value>> {
        let record = result
            .first()
            .ok_or_else(|| MonitorError::feed(&self.name, "query returned no records"))?;

        self.columns
            .iter()
            .map(|col| {
                record
                    .get(col)
                    .cloned()
                    .map(|v| (col.clone(), normalize(v)))
                    .ok_or_else(|| {
                        MonitorError::feed(&self.name, format!("field '{}' missing from record", col))
                    })
            })
            .collect()
    }

    fn notify_data(&self, snapshot: &FeedState) {
        let listeners: Vec<DataListener> = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, l)| l.clone())
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(snapshot, self))).is_err() {
                warn!("Listener on feed {} panicked; feed keeps running", self.name);
            }
        }
    }

    fn notify_error(&self, err: &MonitorError) {
        let listeners: Vec<ErrorListener> = self
            .error_listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, l)| l.clone())
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(err, self))).is_err() {
                warn!("Error listener on feed {} panicked; feed keeps running", self.name);
            }
        }
    }

    fn next_id(&self) -> ListenerId {
        ListenerId(self.next_listener_id.fetch_add(1, Ordering::AcqRel))
    }

    fn lock_schedule(&self) -> std::sync::MutexGuard<'_, Schedule> {
        self.schedule.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for DataFeed {
    fn drop(&mut self) {
        if let Some(pending) = self.lock_schedule().pending.take() {
            pending.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Role;
    use crate::driver::Record;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    struct FixedConnection {
        record: Record,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Connection for FixedConnection {
        fn address(&self) -> &str {
            "core1:7474"
        }

        fn encrypted(&self) -> bool {
            false
        }

        async fn execute(&self, _query: &str, _params: &Params) -> MonitorResult<QueryResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(QueryResult {
                columns: self.record.columns().to_vec(),
                records: vec![self.record.clone(), self.record.clone()],
            })
        }

        async fn close(&self) -> MonitorResult<()> {
            Ok(())
        }
    }

    fn feed_with(record: Record, columns: &[&str]) -> DataFeed {
        let node = Arc::new(Node::new("n1", "core1:7474", Role::Leader));
        let connection = Arc::new(FixedConnection {
            record,
            calls: AtomicUsize::new(0),
        });
        DataFeed::new(
            FeedSpec::new("RETURN 2 AS a, 5 AS b")
                .node(node)
                .connection(connection)
                .columns(columns.iter().copied())
                .rate(Duration::from_millis(100))
                .window_width(Duration::from_secs(1)),
        )
        .unwrap()
    }

    #[test]
    fn test_new_requires_node_connection_query_columns() {
        let node = Arc::new(Node::new("n1", "core1:7474", Role::Leader));
        let err = DataFeed::new(FeedSpec::new("RETURN 1 AS value").node(node).columns(["value"]));
        assert!(matches!(err, Err(MonitorError::Feed { .. })));
    }

    #[test]
    fn test_min_max_defaults_on_empty_feed() {
        let feed = feed_with(Record::from_pairs([("a", json!(2))]), &["a"]);
        assert_eq!(feed.min(), 0.0);
        assert_eq!(feed.max(), 1.0);
        assert!(feed.current_state().is_empty());
    }

    #[tokio::test]
    async fn test_sample_extracts_first_record_and_tracks_min_max() {
        let feed = feed_with(
            Record::from_pairs([("a", json!({"Z": "2"})), ("b", json!(5)), ("c", json!("x"))]),
            &["a", "b"],
        );

        let obs = feed.sample().await.unwrap();
        assert_eq!(obs.get("a"), Some(&json!(2)));
        assert_eq!(obs.get("b"), Some(&json!(5)));
        assert_eq!(obs.get("c"), None);

        assert_eq!(feed.min(), 2.0);
        assert_eq!(feed.max(), 5.0);
        assert_eq!(feed.current_state().events.len(), 1);
        assert_eq!(feed.stats().samples, 1);
    }

    #[tokio::test]
    async fn test_missing_field_is_reported_as_error() {
        let feed = feed_with(Record::from_pairs([("a", json!(1))]), &["a", "missing"]);
        let err = feed.sample().await.unwrap_err();
        assert!(err.to_string().contains("missing"));
        assert_eq!(feed.stats().errors, 1);
        assert!(feed.current_state().last_error.is_some());
    }

    #[tokio::test]
    async fn test_panicking_listener_does_not_break_sampling() {
        let feed = feed_with(Record::from_pairs([("a", json!(1))]), &["a"]);
        let seen = Arc::new(AtomicUsize::new(0));

        feed.add_listener(Arc::new(|_: &FeedState, _: &DataFeed| panic!("listener bug")));
        let counter = seen.clone();
        feed.add_listener(Arc::new(move |_: &FeedState, _: &DataFeed| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(feed.sample().await.is_ok());
        assert!(feed.sample().await.is_ok());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_remove_listener() {
        let feed = feed_with(Record::from_pairs([("a", json!(1))]), &["a"]);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let id = feed.add_listener(Arc::new(move |_: &FeedState, _: &DataFeed| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        feed.sample().await.unwrap();
        assert!(feed.remove_listener(id));
        feed.sample().await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(!feed.remove_listener(id));
    }
}
