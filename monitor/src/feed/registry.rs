use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use super::{DataFeed, FeedKey, FeedSpec};
use crate::errors::{MonitorError, MonitorResult};

/// Shared feeds, one per (node address, query, parameters)
#[derive(Default)]
pub struct FeedRegistry {
    feeds: RwLock<HashMap<FeedKey, Arc<DataFeed>>>,
}

impl FeedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the running feed for this spec, or build and start a new one.
    ///
    /// The rate, columns and window of a later spec are ignored when a feed
    /// with the same key already exists.
    pub fn get_or_create(&self, spec: FeedSpec) -> MonitorResult<Arc<DataFeed>> {
        let key = spec
            .key()
            .ok_or_else(|| MonitorError::feed(spec.query.clone(), "feed spec has no node"))?;

        if let Some(feed) = self.read().get(&key) {
            return Ok(feed.clone());
        }

        let mut feeds = self.feeds.write().unwrap_or_else(|e| e.into_inner());
        if let Some(feed) = feeds.get(&key) {
            return Ok(feed.clone());
        }

        let feed = Arc::new(DataFeed::new(spec)?);
        feeds.insert(key, feed.clone());
        drop(feeds);

        debug!("Created feed {}", feed.name());
        feed.start();
        Ok(feed)
    }

    pub fn get(&self, key: &FeedKey) -> Option<Arc<DataFeed>> {
        self.read().get(key).cloned()
    }

    /// Feeds polling the node at `address`
    pub fn feeds_for(&self, address: &str) -> Vec<Arc<DataFeed>> {
        self.read()
            .iter()
            .filter(|(key, _)| key.address == address)
            .map(|(_, feed)| feed.clone())
            .collect()
    }

    /// Every feed, ordered by key
    pub fn all(&self) -> Vec<Arc<DataFeed>> {
        let feeds = self.read();
        let mut keys: Vec<&FeedKey> = feeds.keys().collect();
        keys.sort();
        keys.into_iter().filter_map(|k| feeds.get(k).cloned()).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop every feed; the feeds stay registered
    pub fn stop_all(&self) {
        let feeds = self.all();
        for feed in &feeds {
            feed.stop();
        }
        info!("Stopped {} data feeds", feeds.len());
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<FeedKey, Arc<DataFeed>>> {
        self.feeds.read().unwrap_or_else(|e| e.into_inner())
    }
}
