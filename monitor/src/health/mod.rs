//! Node health and topology watching
//!
//! Both watchers are thin layers over shared feeds: the pinger waits on a
//! per-node liveness feed, the role watcher listens to a per-node role feed.

pub mod pinger;
pub mod role_watcher;

use std::time::Duration;

use crate::config::Config;

pub use pinger::{HealthPinger, PingResult};
pub use role_watcher::{apply_role_sample, RoleWatcher};

/// Cadence and history of a watcher's feed
#[derive(Debug, Clone, Copy)]
pub struct FeedSettings {
    pub rate: Duration,
    pub window_width: Duration,
}

impl FeedSettings {
    pub fn ping(config: &Config) -> Self {
        Self {
            rate: config.ping_interval(),
            window_width: config.window_width(),
        }
    }

    pub fn role(config: &Config) -> Self {
        Self {
            rate: config.role_interval(),
            window_width: config.window_width(),
        }
    }
}
