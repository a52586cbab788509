use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use monitor::config::{EnvironmentSource, FileHostEnvironment};
use monitor::web::start_web_server;
use monitor::{ConfigManager, HttpConnector, MonitoringContext};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with reduced verbosity
    let env_filter = EnvFilter::from_default_env()
        .add_directive("monitor=info".parse()?)
        .add_directive("tower_http=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    info!("Starting cluster monitor");

    // Load configuration
    let config_manager = ConfigManager::new("config").await?;
    let config = config_manager.get_current_config();
    info!(
        "Configuration loaded: poll every {}ms, {}s window, API on {}:{}",
        config.poll_interval_ms, config.window_width_seconds, config.host, config.port
    );

    let source = match &config.host_environment_file {
        Some(path) => {
            info!("Hosted mode, reading active graph from {}", path.display());
            EnvironmentSource::Hosted(Arc::new(FileHostEnvironment::new(path)))
        }
        None => {
            info!("Environment mode, reading connection from NEO4J_* variables");
            EnvironmentSource::Environment
        }
    };

    let context = match MonitoringContext::initialize(
        config.clone(),
        source,
        Arc::new(HttpConnector::default()),
    )
    .await
    {
        Ok(context) => Arc::new(context),
        Err(e) => {
            error!("Failed to initialize monitoring context: {}", e);
            return Err(e.into());
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown signal received");
    };

    let served = start_web_server(context.clone(), shutdown).await;
    context.shutdown().await;

    if let Err(e) = &served {
        error!("Web server stopped with error: {}", e);
    }
    served
}
