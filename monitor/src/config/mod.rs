pub mod environment;
pub mod manager;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{defaults, feeds, health, transport};

pub use environment::{ActiveGraph, EnvironmentSource, FileHostEnvironment, HostEnvironment};
pub use manager::ConfigManager;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_window_width_seconds")]
    pub window_width_seconds: u64,
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    #[serde(default = "default_role_interval_ms")]
    pub role_interval_ms: u64,
    #[serde(default = "default_ping_timeout_seconds")]
    pub ping_timeout_seconds: u64,
    #[serde(default = "default_connection_timeout_seconds")]
    pub connection_timeout_seconds: u64,
    #[serde(default)]
    pub trust: TrustPolicy,
    pub error_webhook_url: Option<String>,
    // Hosted mode when set, environment variables otherwise
    pub host_environment_file: Option<PathBuf>,
}

fn default_api_host() -> String {
    defaults::API_HOST.to_string()
}

fn default_api_port() -> u16 {
    defaults::API_PORT
}

fn default_poll_interval_ms() -> u64 {
    feeds::DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_window_width_seconds() -> u64 {
    feeds::DEFAULT_WINDOW_WIDTH.as_secs()
}

fn default_ping_interval_ms() -> u64 {
    feeds::PING_INTERVAL.as_millis() as u64
}

fn default_role_interval_ms() -> u64 {
    feeds::ROLE_INTERVAL.as_millis() as u64
}

fn default_ping_timeout_seconds() -> u64 {
    health::PING_TIMEOUT.as_secs()
}

fn default_connection_timeout_seconds() -> u64 {
    transport::CONNECT_TIMEOUT.as_secs()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            poll_interval_ms: default_poll_interval_ms(),
            window_width_seconds: default_window_width_seconds(),
            ping_interval_ms: default_ping_interval_ms(),
            role_interval_ms: default_role_interval_ms(),
            ping_timeout_seconds: default_ping_timeout_seconds(),
            connection_timeout_seconds: default_connection_timeout_seconds(),
            trust: TrustPolicy::default(),
            error_webhook_url: None,
            host_environment_file: None,
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn window_width(&self) -> Duration {
        Duration::from_secs(self.window_width_seconds)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn role_interval(&self) -> Duration {
        Duration::from_millis(self.role_interval_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_seconds)
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            connection_timeout: Duration::from_secs(self.connection_timeout_seconds),
            trust: self.trust,
        }
    }
}

/// Certificate trust policy for encrypted connections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustPolicy {
    #[default]
    SystemCa,
    TrustAll,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TlsLevel {
    Required,
    #[default]
    Optional,
    Disabled,
}

/// Options applied to every connection the registry creates
#[derive(Debug, Clone, Copy)]
pub struct TransportOptions {
    pub connection_timeout: Duration,
    pub trust: TrustPolicy,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Config::default().transport_options()
    }
}

/// Where to connect first, and with which credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub tls_level: TlsLevel,
    pub database: String,
}

impl ConnectionParams {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            encrypted: self.tls_level == TlsLevel::Required,
        }
    }
}

/// Credentials handed to the connector when a connection is first built
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub database: String,
    pub encrypted: bool,
}
