use super::Config;
use crate::constants::feeds::MAX_WINDOW_SAMPLES;
use crate::errors::{ConfigError, MonitorResult};
use crate::feed::window::samples_for;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

pub struct ConfigManager {
    current_config: Arc<Config>,
}

impl ConfigManager {
    pub async fn new(config_dir: impl AsRef<Path>) -> MonitorResult<Self> {
        let config = Self::load_configuration(config_dir.as_ref()).await?;
        Ok(Self {
            current_config: Arc::new(config),
        })
    }

    pub fn get_current_config(&self) -> Arc<Config> {
        self.current_config.clone()
    }

    async fn load_configuration(config_dir: &Path) -> MonitorResult<Config> {
        let main_config_path = config_dir.join("main.toml");
        debug!("Loading monitor config: {}", main_config_path.display());

        let content = fs::read_to_string(&main_config_path)
            .await
            .map_err(|e| ConfigError::LoadFailed {
                path: main_config_path.display().to_string(),
                reason: e.to_string(),
            })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
            path: main_config_path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::validate(&config)?;

        info!(
            "Loaded config: poll every {}ms, {}s window, ping every {}ms, role check every {}ms",
            config.poll_interval_ms,
            config.window_width_seconds,
            config.ping_interval_ms,
            config.role_interval_ms
        );

        Ok(config)
    }

    fn validate(config: &Config) -> Result<(), ConfigError> {
        let intervals = [
            ("poll_interval_ms", config.poll_interval_ms),
            ("ping_interval_ms", config.ping_interval_ms),
            ("role_interval_ms", config.role_interval_ms),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "interval must be greater than zero".to_string(),
                });
            }
        }

        if config.window_width_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "window_width_seconds".to_string(),
                reason: "window must be greater than zero".to_string(),
            });
        }

        let shortest = config
            .poll_interval()
            .min(config.ping_interval())
            .min(config.role_interval());
        let samples = samples_for(config.window_width(), shortest);
        if samples > MAX_WINDOW_SAMPLES as f64 {
            return Err(ConfigError::InvalidValue {
                field: "window_width_seconds".to_string(),
                reason: format!(
                    "window needs {} samples at {:?}, limit is {}",
                    samples, shortest, MAX_WINDOW_SAMPLES
                ),
            });
        }

        if let Some(url) = &config.error_webhook_url {
            if !url.is_empty() && !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::InvalidValue {
                    field: "error_webhook_url".to_string(),
                    reason: format!("'{}' is not an http(s) URL", url),
                });
            }
        }

        Ok(())
    }
}
