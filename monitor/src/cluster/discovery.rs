use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{MemberRow, Node, Role, StandaloneRow};
use crate::config::{ConnectionParams, Credentials, TlsLevel};
use crate::driver::{Connection, ConnectionRegistry, Params};
use crate::errors::MonitorResult;
use crate::feed::queries;
use crate::health::HealthPinger;
use crate::services::{tags, ErrorTracker};

/// Learns cluster membership from the seed connection.
///
/// A standalone instance has no cluster-overview procedure; it is treated as
/// a cluster of one SINGLE member built from the seed parameters.
pub struct TopologyDiscoverer {
    connections: Arc<ConnectionRegistry>,
    credentials: Credentials,
    pinger: Arc<HealthPinger>,
    tracker: ErrorTracker,
}

impl TopologyDiscoverer {
    pub fn new(
        connections: Arc<ConnectionRegistry>,
        credentials: Credentials,
        pinger: Arc<HealthPinger>,
        tracker: ErrorTracker,
    ) -> Self {
        Self {
            connections,
            credentials,
            pinger,
            tracker,
        }
    }

    /// Enumerate members, check each one's capabilities and ping each once.
    ///
    /// Only the overview query can fail discovery. Capability and ping
    /// failures are reported and leave the node in the roster.
    #[instrument(skip(self, seed, params), fields(seed = %seed.address()))]
    pub async fn discover(
        &self,
        seed: &dyn Connection,
        params: &ConnectionParams,
    ) -> MonitorResult<Vec<Arc<Node>>> {
        let rows = self.member_rows(seed, params).await?;

        let nodes = rows
            .iter()
            .map(|row| Node::from_row(row, &params.database))
            .collect::<MonitorResult<Vec<_>>>()
            .map_err(|e| {
                self.tracker
                    .capture(&e, tags([("address", seed.address()), ("operation", "discovery")]));
                e
            })?
            .into_iter()
            .map(Arc::new)
            .collect::<Vec<_>>();

        info!(
            "Discovered {} cluster member(s): {}",
            nodes.len(),
            nodes
                .iter()
                .map(|n| format!("{} ({})", n.address(), n.role()))
                .collect::<Vec<_>>()
                .join(", ")
        );

        join_all(nodes.iter().map(|node| self.check_capabilities(node))).await;
        join_all(nodes.iter().map(|node| self.pinger.ping(node))).await;

        Ok(nodes)
    }

    async fn member_rows(
        &self,
        seed: &dyn Connection,
        params: &ConnectionParams,
    ) -> MonitorResult<Vec<MemberRow>> {
        match seed.execute(queries::CLUSTER_OVERVIEW, &Params::new()).await {
            Ok(result) => Ok(result.records.into_iter().map(MemberRow::Real).collect()),
            Err(e) if e.is_procedure_not_found() => {
                info!("No cluster overview on {}, monitoring as a single node", seed.address());
                Ok(vec![MemberRow::Synthetic(standalone_row(params))])
            }
            Err(e) => {
                error!("Cluster discovery failed on {}: {}", seed.address(), e);
                self.tracker
                    .capture(&e, tags([("address", seed.address()), ("operation", "discovery")]));
                Err(e)
            }
        }
    }

    async fn check_capabilities(&self, node: &Arc<Node>) {
        let checked = match self
            .connections
            .get(node.address(), &self.credentials)
            .await
        {
            Ok(connection) => node.check_components(connection.as_ref()).await,
            Err(e) => Err(e),
        };

        if let Err(e) = checked {
            warn!("Capability check failed for {}: {}", node.address(), e);
            if e.is_connectivity() {
                node.set_reachable(false);
            }
            self.tracker.capture(
                &e,
                tags([("address", node.address()), ("operation", "check_components")]),
            );
        }
    }
}

/// Member row standing in for a standalone instance
pub fn standalone_row(params: &ConnectionParams) -> StandaloneRow {
    let scheme = if params.tls_level == TlsLevel::Required {
        "https"
    } else {
        "http"
    };

    StandaloneRow {
        id: Uuid::new_v4().to_string(),
        addresses: vec![format!("{}://{}", scheme, params.address())],
        role: Role::Single,
        database: params.database.clone(),
    }
}
