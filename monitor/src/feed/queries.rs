//! Query library: every statement the monitor sends to a node

use serde_json::Value;
use std::time::Duration;

use crate::driver::Params;

/// A recurring query preset: statement, fields to extract, default interval
#[derive(Debug, Clone)]
pub struct FeedQuery {
    pub query: &'static str,
    pub columns: &'static [&'static str],
    pub rate: Duration,
}

/// Trivial liveness check
pub const PING: FeedQuery = FeedQuery {
    query: "RETURN true AS value",
    columns: &["value"],
    rate: crate::constants::feeds::PING_INTERVAL,
};

/// Role of this member for the monitored database
pub const CLUSTER_ROLE: FeedQuery = FeedQuery {
    query: "CALL dbms.cluster.role($database) YIELD role RETURN role",
    columns: &["role"],
    rate: crate::constants::feeds::ROLE_INTERVAL,
};

/// Parameters for [`CLUSTER_ROLE`]
pub fn cluster_role_params(database: &str) -> Params {
    let mut params = Params::new();
    params.insert("database".to_string(), Value::from(database));
    params
}

pub const CLUSTER_OVERVIEW: &str = "CALL dbms.cluster.overview()";

pub const CURRENT_USER: &str = "CALL dbms.showCurrentUser()";

pub const DBMS_COMPONENTS: &str =
    "CALL dbms.components() YIELD name, versions, edition RETURN name, versions, edition";

pub const NATIVE_AUTH_PROBE: &str = "CALL dbms.procedures() YIELD name \
     WHERE name = 'dbms.security.listUsers' RETURN count(*) AS value";

/// Introspection statements used by the diagnostics report
pub mod diagnostics {
    pub const LIST_USERS: &str = "CALL dbms.security.listUsers()";
    pub const LIST_ROLES: &str = "CALL dbms.security.listRoles()";
    pub const LIST_INDEXES: &str = "CALL db.indexes()";
    pub const LIST_CONSTRAINTS: &str = "CALL db.constraints()";
    pub const QUERY_JMX: &str = "CALL dbms.queryJmx('*:*')";
    pub const LIST_CONFIG: &str = "CALL dbms.listConfig()";

    // Single-value probes; each must return a column named `value`
    pub const APOC_VERSION: &str = "RETURN apoc.version() AS value";
    pub const NODE_COUNT: &str = "MATCH (n) RETURN count(n) AS value";
    pub const LABELS: &str = "CALL db.labels() YIELD label RETURN collect(label) AS value";
}
