//! Error types for the cluster monitor
//!
//! Provides structured error handling for the failure classes the monitor has
//! to tell apart: unreachable nodes, queries a node refuses, configuration that
//! leaves nothing to connect to, and discovery failures.

use std::fmt;

/// Main error type for the cluster monitor
#[derive(Debug, Clone)]
pub enum MonitorError {
    /// A node could not be reached (transport failure, timeout, HTTP error status)
    Connectivity { address: String, reason: String },

    /// A node answered but refused the query
    QueryExecution(QueryError),

    /// Configuration errors, fatal at startup
    Config(ConfigError),

    /// Topology discovery failed for a reason other than standalone mode
    Discovery { reason: String },

    /// A feed could not be built or could not extract its fields
    Feed { name: String, reason: String },

    /// Other errors with context
    Other(String),
}

/// Error reported by a node for a specific query
#[derive(Debug, Clone)]
pub struct QueryError {
    pub address: String,
    pub query: String,
    pub code: String,
    pub message: String,
}

/// Configuration error variants
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// Failed to load configuration file
    LoadFailed { path: String, reason: String },

    /// Invalid configuration value
    InvalidValue { field: String, reason: String },

    /// Missing required configuration
    MissingRequired { field: String },

    /// The host environment has no active graph to connect to
    NoActiveGraph,
}

pub type MonitorResult<T> = std::result::Result<T, MonitorError>;

impl MonitorError {
    pub fn connectivity(address: impl Into<String>, reason: impl fmt::Display) -> Self {
        MonitorError::Connectivity {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    pub fn feed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        MonitorError::Feed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// True when the failure means the cluster-overview procedure does not exist,
    /// which is how a standalone instance answers.
    pub fn is_procedure_not_found(&self) -> bool {
        match self {
            MonitorError::QueryExecution(e) => {
                e.code.ends_with("ProcedureNotFound")
                    || e.message.to_lowercase().contains("no procedure")
            }
            _ => false,
        }
    }

    /// True when the node could not be reached at all
    pub fn is_connectivity(&self) -> bool {
        matches!(self, MonitorError::Connectivity { .. })
    }
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorError::Connectivity { address, reason } => {
                write!(f, "Cannot reach {}: {}", address, reason)
            }
            MonitorError::QueryExecution(e) => write!(f, "Query error: {}", e),
            MonitorError::Config(e) => write!(f, "Configuration error: {}", e),
            MonitorError::Discovery { reason } => write!(f, "Discovery failed: {}", reason),
            MonitorError::Feed { name, reason } => write!(f, "Feed {} failed: {}", name, reason),
            MonitorError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rejected '{}': {} ({})",
            self.address, self.query, self.message, self.code
        )
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::LoadFailed { path, reason } => {
                write!(f, "Failed to load config from '{}': {}", path, reason)
            }
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
            ConfigError::MissingRequired { field } => {
                write!(f, "Missing required field: {}", field)
            }
            ConfigError::NoActiveGraph => {
                write!(f, "An active database connection is required to start monitoring")
            }
        }
    }
}

impl std::error::Error for MonitorError {}
impl std::error::Error for QueryError {}
impl std::error::Error for ConfigError {}

impl From<anyhow::Error> for MonitorError {
    fn from(err: anyhow::Error) -> Self {
        MonitorError::Other(err.to_string())
    }
}

impl From<ConfigError> for MonitorError {
    fn from(err: ConfigError) -> Self {
        MonitorError::Config(err)
    }
}

impl From<QueryError> for MonitorError {
    fn from(err: QueryError) -> Self {
        MonitorError::QueryExecution(err)
    }
}
