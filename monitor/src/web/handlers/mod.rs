//! HTTP request handlers for the monitor API.
//!
//! - `cluster` - Topology, role events, current user, on-demand ping
//! - `common` - Response envelope and error mapping
//! - `feeds` - Feed statistics and diagnostics reports

pub mod cluster;
pub mod common;
pub mod feeds;

pub use cluster::*;
pub use feeds::*;
