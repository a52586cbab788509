//! Topology change log
//!
//! Keeps every observed role change so that a leadership failover can be
//! explained after the fact. Events are appended from feed listeners, which
//! run synchronously, hence the blocking lock.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::RwLock;
use tracing::info;

use super::Role;

#[derive(Debug, Clone, Serialize)]
pub struct ClusterEvent {
    pub date: DateTime<Utc>,
    pub message: String,
    pub address: String,
    pub old_role: Role,
    pub new_role: Role,
}

#[derive(Debug, Default)]
pub struct ClusterEventLog {
    events: RwLock<Vec<ClusterEvent>>,
}

impl ClusterEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_role_change(&self, address: &str, old_role: Role, new_role: Role) -> ClusterEvent {
        let event = ClusterEvent {
            date: Utc::now(),
            message: format!("Role change from {} to {}", old_role, new_role),
            address: address.to_string(),
            old_role,
            new_role,
        };
        info!("{}: {}", address, event.message);

        self.events
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        event
    }

    pub fn events(&self) -> Vec<ClusterEvent> {
        self.events.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
