pub mod cluster;
pub mod config;
pub mod constants;
pub mod context;
pub mod diagnostics;
pub mod driver;
pub mod errors;
pub mod feed;
pub mod health;
pub mod services;
pub mod web;

// Re-export commonly used types
pub use cluster::{ClusterEvent, Node, Role};
pub use config::{Config, ConfigManager, EnvironmentSource};
pub use context::{CurrentUser, MonitoringContext};
pub use driver::{ConnectionRegistry, HttpConnector};
pub use errors::{MonitorError, MonitorResult};
pub use feed::{DataFeed, FeedRegistry, FeedSpec};
pub use services::ErrorTracker;
