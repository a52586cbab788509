//! Test configuration builder for creating config directories programmatically

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Builder writing a `main.toml` into a temporary config directory
pub struct TestConfigBuilder {
    temp_dir: TempDir,
    entries: Vec<(String, String)>,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        Self {
            temp_dir,
            entries: Vec::new(),
        }
    }

    /// Set a raw TOML value, e.g. `.set("port", "9000")` or `.set("trust", "\"trust_all\"")`
    pub fn set(mut self, key: &str, raw_value: &str) -> Self {
        self.entries.push((key.to_string(), raw_value.to_string()));
        self
    }

    pub fn poll_interval_ms(self, ms: u64) -> Self {
        self.set("poll_interval_ms", &ms.to_string())
    }

    pub fn error_webhook(self, url: &str) -> Self {
        self.set("error_webhook_url", &format!("\"{}\"", url))
    }

    /// Build and write config files to temp directory
    pub fn build(self) -> TestConfig {
        let config_dir = self.temp_dir.path().join("config");
        fs::create_dir_all(&config_dir).expect("Failed to create config dir");

        let main_toml: String = self
            .entries
            .iter()
            .map(|(key, value)| format!("{} = {}\n", key, value))
            .collect();
        fs::write(config_dir.join("main.toml"), main_toml).expect("Failed to write main.toml");

        TestConfig {
            _temp_dir: self.temp_dir,
            config_dir,
        }
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A written config directory, removed when dropped
pub struct TestConfig {
    _temp_dir: TempDir,
    pub config_dir: PathBuf,
}
