//! Central repository for timeouts, intervals, and limits
//!
//! Constants are grouped by the component that consumes them so that the
//! defaults of the config file and the hard-coded behaviour stay in one place.

use std::time::Duration;

/// Feed (recurring sampler) constants
pub mod feeds {
    use super::Duration;

    /// Default polling interval for ad-hoc feeds
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

    /// Default width of the rolling window kept by a feed (7 minutes)
    pub const DEFAULT_WINDOW_WIDTH: Duration = Duration::from_secs(60 * 7);

    /// Slack added on top of `window / interval` when sizing the ring buffer
    pub const WINDOW_SLACK_FACTOR: f64 = 1.25;

    /// Upper bound on the entries a single window may hold
    pub const MAX_WINDOW_SAMPLES: usize = 100_000;

    /// Interval of the liveness feed behind every ping
    pub const PING_INTERVAL: Duration = Duration::from_millis(1000);

    /// Interval of the role-introspection feed
    pub const ROLE_INTERVAL: Duration = Duration::from_millis(5000);

    /// Capacity of the broadcast channel that carries feed outcomes
    pub const OUTCOME_CHANNEL_CAPACITY: usize = 16;
}

/// Transport constants
pub mod transport {
    use super::Duration;

    /// Timeout for establishing a connection to a node
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Default port of the cluster's HTTP endpoint
    pub const DEFAULT_PORT: u16 = 7474;

    /// Default database name
    pub const DEFAULT_DATABASE: &str = "neo4j";
}

/// Health check constants
pub mod health {
    use super::Duration;

    /// Maximum time a one-shot ping waits for the next liveness sample
    pub const PING_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Diagnostics constants
pub mod diagnostics {
    /// Replacement for every secret-bearing value in a report
    pub const REDACTION_MARKER: &str = "********";

    /// Keys whose values are always redacted (compared case-insensitively)
    pub const SECRET_KEYS: &[&str] = &["password"];

    /// Marker used when the host environment integration is absent
    pub const HOST_ENVIRONMENT_MISSING: &str = "MISSING";
}

/// Error tracking constants
pub mod errors {
    /// Number of recent captures kept in memory
    pub const RECENT_CAPTURE_LIMIT: usize = 100;

    /// Webhook request timeout
    pub const WEBHOOK_TIMEOUT_SECONDS: u64 = 10;
}

/// Default configuration values
pub mod defaults {
    /// Default API bind address
    pub const API_HOST: &str = "127.0.0.1";

    /// Default API port
    pub const API_PORT: u16 = 8096;

    /// Default username when none is supplied by the environment
    pub const USERNAME: &str = "neo4j";

    /// Default password when none is supplied by the environment
    pub const PASSWORD: &str = "admin";

    /// Default graph/project name in environment mode
    pub const GRAPH_NAME: &str = "environment";
}
