//! Cluster members and the rows they are built from

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tracing::{debug, warn};

use crate::driver::{Connection, Params, Record};
use crate::errors::{MonitorError, MonitorResult};
use crate::feed::queries;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Leader,
    Follower,
    ReadReplica,
    Single,
    Unknown,
}

impl Role {
    /// Case-insensitive parse of a role string as the cluster reports it
    pub fn parse(raw: &str) -> Role {
        match raw.trim().to_ascii_uppercase().as_str() {
            "LEADER" => Role::Leader,
            "FOLLOWER" => Role::Follower,
            "READ_REPLICA" => Role::ReadReplica,
            "SINGLE" => Role::Single,
            _ => Role::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Leader => "LEADER",
            Role::Follower => "FOLLOWER",
            Role::ReadReplica => "READ_REPLICA",
            Role::Single => "SINGLE",
            Role::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row synthesised for a standalone instance that has no cluster overview
#[derive(Debug, Clone)]
pub struct StandaloneRow {
    pub id: String,
    pub addresses: Vec<String>,
    pub role: Role,
    pub database: String,
}

/// A cluster member row, either returned by the overview query or synthesised
#[derive(Debug, Clone)]
pub enum MemberRow {
    Real(Record),
    Synthetic(StandaloneRow),
}

impl MemberRow {
    pub fn get(&self, field: &str) -> Option<Value> {
        match self {
            MemberRow::Real(record) => record.get(field).cloned(),
            MemberRow::Synthetic(row) => match field {
                "id" => Some(Value::from(row.id.clone())),
                "addresses" => Some(json!(row.addresses)),
                "role" => Some(Value::from(row.role.as_str())),
                "database" => Some(Value::from(row.database.clone())),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Capabilities {
    pub enterprise: bool,
    pub native_auth: bool,
}

/// One member of the observed cluster.
///
/// Shared by reference between the pinger, the role watcher and the
/// diagnostics aggregator; only the role watcher writes `role`.
#[derive(Debug)]
pub struct Node {
    id: String,
    address: String,
    addresses: Vec<String>,
    database: String,
    role: RwLock<Role>,
    capabilities: RwLock<Capabilities>,
    version: RwLock<Option<String>>,
    reachable: AtomicBool,
}

impl Node {
    pub fn new(id: impl Into<String>, address: impl Into<String>, role: Role) -> Self {
        let address = address.into();
        Self {
            id: id.into(),
            addresses: vec![format!("http://{}", address)],
            address,
            database: crate::constants::transport::DEFAULT_DATABASE.to_string(),
            role: RwLock::new(role),
            capabilities: RwLock::new(Capabilities::default()),
            version: RwLock::new(None),
            reachable: AtomicBool::new(true),
        }
    }

    /// Build a node from one overview row. `default_database` applies when the
    /// row names no single database; it also selects the role out of a
    /// `databases` map.
    pub fn from_row(row: &MemberRow, default_database: &str) -> MonitorResult<Self> {
        let id = match row.get("id") {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => return Err(MonitorError::Discovery {
                reason: "cluster member row has no id".to_string(),
            }),
        };

        let addresses: Vec<String> = match row.get("addresses") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        let address = pick_http_address(&addresses).ok_or_else(|| MonitorError::Discovery {
            reason: format!("cluster member {} advertises no usable address", id),
        })?;

        // Older versions report a single database, newer ones a map of them
        let database = match row.get("database") {
            Some(Value::String(s)) => s,
            _ => default_database.to_string(),
        };

        let role = match row.get("role") {
            Some(Value::String(raw)) => Role::parse(&raw),
            _ => row
                .get("databases")
                .and_then(|dbs| dbs.get(&database).and_then(Value::as_str).map(Role::parse))
                .unwrap_or(Role::Unknown),
        };

        Ok(Self {
            id,
            address,
            addresses,
            database,
            role: RwLock::new(role),
            capabilities: RwLock::new(Capabilities::default()),
            version: RwLock::new(None),
            reachable: AtomicBool::new(true),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// `host:port` the monitor connects to
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn role(&self) -> Role {
        *self.role.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Store a new role, returning the previous one
    pub fn set_role(&self, role: Role) -> Role {
        let mut guard = self.role.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, role)
    }

    pub fn capabilities(&self) -> Capabilities {
        *self.capabilities.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_enterprise(&self) -> bool {
        self.capabilities().enterprise
    }

    pub fn supports_native_auth(&self) -> bool {
        self.capabilities().native_auth
    }

    pub fn version(&self) -> Option<String> {
        self.version.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Acquire)
    }

    pub fn set_reachable(&self, reachable: bool) {
        let was = self.reachable.swap(reachable, Ordering::AcqRel);
        if was && !reachable {
            warn!("Node {} marked unreachable", self.address);
        } else if !was && reachable {
            debug!("Node {} reachable again", self.address);
        }
    }

    /// Probe edition and native-auth support on this node
    pub async fn check_components(&self, connection: &dyn Connection) -> MonitorResult<()> {
        let components = connection
            .execute(queries::DBMS_COMPONENTS, &Params::new())
            .await?;

        let mut capabilities = Capabilities::default();
        if let Some(rec) = components.first() {
            capabilities.enterprise = rec
                .get("edition")
                .and_then(Value::as_str)
                .map(|e| e.eq_ignore_ascii_case("enterprise"))
                .unwrap_or(false);

            let version = rec
                .get("versions")
                .and_then(|v| v.get(0))
                .and_then(Value::as_str)
                .map(str::to_string);
            *self.version.write().unwrap_or_else(|e| e.into_inner()) = version;
        }

        // Community edition and disabled auth both lack the user-listing procedure
        capabilities.native_auth = match connection
            .execute(queries::NATIVE_AUTH_PROBE, &Params::new())
            .await
        {
            Ok(result) => result
                .first()
                .and_then(|r| r.get("value"))
                .and_then(Value::as_i64)
                .map(|n| n > 0)
                .unwrap_or(false),
            Err(e) if e.is_connectivity() => return Err(e),
            Err(e) => {
                debug!("Native auth probe failed on {}: {}", self.address, e);
                false
            }
        };

        debug!(
            "Node {} capabilities: enterprise={}, native_auth={}",
            self.address, capabilities.enterprise, capabilities.native_auth
        );
        *self.capabilities.write().unwrap_or_else(|e| e.into_inner()) = capabilities;
        Ok(())
    }

    pub fn as_json(&self) -> Value {
        json!({
            "id": self.id,
            "address": self.address,
            "addresses": self.addresses,
            "role": self.role(),
            "database": self.database,
            "version": self.version(),
            "enterprise": self.is_enterprise(),
            "nativeAuth": self.supports_native_auth(),
            "reachable": self.is_reachable(),
        })
    }
}

/// `host:port` of the first HTTP(S) address, or of the first address at all
fn pick_http_address(addresses: &[String]) -> Option<String> {
    let strip = |a: &str| a.split_once("://").map(|(_, rest)| rest.to_string());

    addresses
        .iter()
        .find(|a| a.starts_with("http://"))
        .or_else(|| addresses.iter().find(|a| a.starts_with("https://")))
        .and_then(|a| strip(a.as_str()))
        .or_else(|| {
            addresses
                .first()
                .map(|a| strip(a.as_str()).unwrap_or_else(|| a.clone()))
        })
        .map(|a| a.trim_end_matches('/').to_string())
}
