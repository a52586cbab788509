//! Cluster topology: members, their roles, and how they are discovered

pub mod discovery;
pub mod events;
pub mod node;

pub use discovery::{standalone_row, TopologyDiscoverer};
pub use events::{ClusterEvent, ClusterEventLog};
pub use node::{Capabilities, MemberRow, Node, Role, StandaloneRow};
