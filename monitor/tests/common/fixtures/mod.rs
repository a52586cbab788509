//! This module provides reusable test utilities:
//! - A scripted in-memory cluster (connections, connector, host environment)
//! - A mock webhook server for error reports
//! - Test configuration builders
//! - Common test data

// Allow unused code in test fixtures - not every test binary uses every helper
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod mock_cluster;
pub mod mock_webhook;
pub mod test_config;
pub mod test_data;

// Re-export commonly used items
pub use mock_cluster::{MockCluster, MockConnector, NodeScript, ScriptedConnection, StaticHostEnvironment};
pub use mock_webhook::MockWebhookServer;
pub use test_config::TestConfigBuilder;
pub use test_data::*;
