//! One long-lived connection per node address
//!
//! # Known limitation
//!
//! Credentials are only consulted the first time an address is seen. A later
//! `get` for the same address returns the existing connection even when it is
//! passed different credentials, so credential rotation does not take effect
//! until the registry is shut down and rebuilt.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, instrument, warn};

use super::{Connection, Connector};
use crate::config::{Credentials, TransportOptions};
use crate::errors::{MonitorError, MonitorResult};

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub address: String,
    pub encrypted: bool,
}

type Slot = Arc<OnceCell<Arc<dyn Connection>>>;

pub struct ConnectionRegistry {
    connector: Arc<dyn Connector>,
    options: TransportOptions,
    // The map lock is never held across a connect; each address waits on its own slot
    connections: RwLock<HashMap<String, Slot>>,
}

impl ConnectionRegistry {
    pub fn new(connector: Arc<dyn Connector>, options: TransportOptions) -> Self {
        Self {
            connector,
            options,
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Existing connection for `address`, or a new one built with `credentials`.
    /// Concurrent callers for one address share a single connect; other
    /// addresses are not held up by it. Connect failures propagate and leave
    /// the slot empty for the next caller.
    #[instrument(skip(self, credentials), fields(address = %address))]
    pub async fn get(
        &self,
        address: &str,
        credentials: &Credentials,
    ) -> MonitorResult<Arc<dyn Connection>> {
        let slot = self.slot(address).await;
        let connection = slot
            .get_or_try_init(|| async move {
                let connection = self
                    .connector
                    .connect(address, credentials, &self.options)
                    .await?;
                info!(
                    "Opened connection to {} (encrypted: {})",
                    address, credentials.encrypted
                );
                Ok::<_, MonitorError>(connection)
            })
            .await?;
        Ok(connection.clone())
    }

    async fn slot(&self, address: &str) -> Slot {
        if let Some(slot) = self.connections.read().await.get(address) {
            return slot.clone();
        }
        self.connections
            .write()
            .await
            .entry(address.to_string())
            .or_default()
            .clone()
    }

    /// Open connections, keyed by address
    async fn open(&self) -> Vec<(String, Arc<dyn Connection>)> {
        self.connections
            .read()
            .await
            .iter()
            .filter_map(|(address, slot)| slot.get().map(|c| (address.clone(), c.clone())))
            .collect()
    }

    pub async fn contains(&self, address: &str) -> bool {
        self.connections
            .read()
            .await
            .get(address)
            .is_some_and(|slot| slot.initialized())
    }

    pub async fn len(&self) -> usize {
        self.open().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Known addresses and whether their connection is encrypted
    pub async fn describe(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> = self
            .open()
            .await
            .into_iter()
            .map(|(address, conn)| ConnectionInfo {
                address,
                encrypted: conn.encrypted(),
            })
            .collect();
        infos.sort_by(|a, b| a.address.cmp(&b.address));
        infos
    }

    /// Close every connection. Safe to call more than once.
    pub async fn close_all(&self) {
        let drained: Vec<(String, Arc<dyn Connection>)> = self
            .connections
            .write()
            .await
            .drain()
            .filter_map(|(address, slot)| slot.get().map(|c| (address, c.clone())))
            .collect();

        if drained.is_empty() {
            debug!("No connections to close");
            return;
        }

        for (address, connection) in drained {
            if let Err(e) = connection.close().await {
                warn!("Failed to close connection to {}: {}", address, e);
            }
        }
    }
}
