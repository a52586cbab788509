//! Sources of the initial connection parameters.
//!
//! The monitor starts from exactly one of two places: a host environment
//! integration that knows which graph is active, or the process environment.
//! Whichever is used also supplies the project/graph descriptors that end up
//! (redacted) in the diagnostics report.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ConnectionParams, TlsLevel};
use crate::constants::{defaults, transport};
use crate::errors::{ConfigError, MonitorResult};

/// The graph the monitor attaches to, plus the descriptors it came from
#[derive(Debug, Clone)]
pub struct ActiveGraph {
    pub project: Value,
    pub graph: Value,
    pub params: ConnectionParams,
}

/// A host integration that can tell which graph is currently active
#[async_trait]
pub trait HostEnvironment: Send + Sync {
    /// First graph whose status is ACTIVE, if any
    async fn first_active(&self) -> MonitorResult<Option<ActiveGraph>>;

    /// Raw integration context, included in diagnostics after redaction
    async fn context(&self) -> MonitorResult<Value>;
}

/// Deployment mode: which source the initial parameters come from
#[derive(Clone)]
pub enum EnvironmentSource {
    Environment,
    Hosted(Arc<dyn HostEnvironment>),
}

impl EnvironmentSource {
    pub async fn resolve(&self) -> MonitorResult<ActiveGraph> {
        match self {
            EnvironmentSource::Environment => {
                Ok(ActiveGraph::from_vars(|key| std::env::var(key).ok()))
            }
            EnvironmentSource::Hosted(host) => host
                .first_active()
                .await?
                .ok_or_else(|| ConfigError::NoActiveGraph.into()),
        }
    }

    pub fn host_environment(&self) -> Option<&Arc<dyn HostEnvironment>> {
        match self {
            EnvironmentSource::Hosted(host) => Some(host),
            EnvironmentSource::Environment => None,
        }
    }
}

impl ActiveGraph {
    /// Build the active graph from environment variables, using `lookup` to read them
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let tls_level = if lookup("ENCRYPTION_REQUIRED").is_some() {
            TlsLevel::Required
        } else {
            TlsLevel::Optional
        };
        let port = lookup("NEO4J_PORT")
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(transport::DEFAULT_PORT);

        let params = ConnectionParams {
            host: get("NEO4J_HOST", "localhost"),
            port,
            username: get("NEO4J_USERNAME", defaults::USERNAME),
            password: get("NEO4J_PASSWORD", defaults::PASSWORD),
            tls_level,
            database: get("NEO4J_DATABASE", transport::DEFAULT_DATABASE),
        };

        let name = get("GRAPH_NAME", defaults::GRAPH_NAME);
        let graph = json!({
            "name": name,
            "status": get("GRAPH_STATUS", "ACTIVE"),
            "databaseStatus": get("DATABASE_STATUS", "RUNNING"),
            "databaseType": get("DATABASE_TYPE", "neo4j"),
            "id": lookup("DATABASE_UUID").unwrap_or_else(|| Uuid::new_v4().to_string()),
            "connection": {
                "configuration": {
                    "path": ".",
                    "protocols": {
                        "http": {
                            "host": params.host,
                            "port": params.port,
                            "username": params.username,
                            "password": params.password,
                            "enabled": true,
                            "tlsLevel": params.tls_level,
                        }
                    }
                }
            }
        });
        let project = json!({ "name": name, "graphs": [graph.clone()] });

        Self {
            project,
            graph,
            params,
        }
    }
}

/// Host environment backed by a JSON context document on disk
pub struct FileHostEnvironment {
    path: PathBuf,
}

impl FileHostEnvironment {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    async fn read_context(&self) -> MonitorResult<Value> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ConfigError::LoadFailed {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;
        let context = serde_json::from_str(&content).map_err(|e| ConfigError::LoadFailed {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(context)
    }
}

#[async_trait]
impl HostEnvironment for FileHostEnvironment {
    async fn first_active(&self) -> MonitorResult<Option<ActiveGraph>> {
        let context = self.read_context().await?;
        let projects = context["projects"].as_array().cloned().unwrap_or_default();

        for project in projects {
            let graphs = project["graphs"].as_array().cloned().unwrap_or_default();
            for graph in graphs {
                if graph["status"].as_str() != Some("ACTIVE") {
                    continue;
                }
                let params = params_from_graph(&graph)?;
                info!(
                    "Host environment selected graph {} at {}",
                    graph["name"].as_str().unwrap_or("unnamed"),
                    params.address()
                );
                return Ok(Some(ActiveGraph {
                    project,
                    graph,
                    params,
                }));
            }
        }

        debug!("No active graph in {}", self.path.display());
        Ok(None)
    }

    async fn context(&self) -> MonitorResult<Value> {
        self.read_context().await
    }
}

fn params_from_graph(graph: &Value) -> Result<ConnectionParams, ConfigError> {
    let configuration = &graph["connection"]["configuration"];
    let http = &configuration["protocols"]["http"];
    if http.is_null() {
        return Err(ConfigError::MissingRequired {
            field: "connection.configuration.protocols.http".to_string(),
        });
    }

    let host = http["host"]
        .as_str()
        .ok_or_else(|| ConfigError::MissingRequired {
            field: "protocols.http.host".to_string(),
        })?
        .to_string();

    // Integrations write the port either as a number or as a string
    let port = match &http["port"] {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.parse::<u16>().ok(),
        Value::Null => Some(transport::DEFAULT_PORT),
        _ => None,
    }
    .ok_or_else(|| ConfigError::InvalidValue {
        field: "protocols.http.port".to_string(),
        reason: format!("not a port number: {}", http["port"]),
    })?;

    let tls_level = match http["tlsLevel"].as_str() {
        Some("REQUIRED") => TlsLevel::Required,
        Some("DISABLED") => TlsLevel::Disabled,
        _ => TlsLevel::Optional,
    };

    Ok(ConnectionParams {
        host,
        port,
        username: http["username"]
            .as_str()
            .unwrap_or(defaults::USERNAME)
            .to_string(),
        password: http["password"]
            .as_str()
            .unwrap_or(defaults::PASSWORD)
            .to_string(),
        tls_level,
        database: configuration["database"]
            .as_str()
            .unwrap_or(transport::DEFAULT_DATABASE)
            .to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_from_vars_defaults() {
        let active = ActiveGraph::from_vars(|_| None);
        assert_eq!(active.params.host, "localhost");
        assert_eq!(active.params.port, 7474);
        assert_eq!(active.params.username, "neo4j");
        assert_eq!(active.params.tls_level, TlsLevel::Optional);
        assert_eq!(active.graph["name"], "environment");
        assert_eq!(active.project["graphs"][0]["status"], "ACTIVE");
    }

    #[test]
    fn test_from_vars_overrides() {
        let vars: HashMap<&str, &str> = [
            ("NEO4J_HOST", "core1.internal"),
            ("NEO4J_PORT", "7473"),
            ("NEO4J_PASSWORD", "s3cret"),
            ("ENCRYPTION_REQUIRED", "1"),
            ("GRAPH_NAME", "prod"),
        ]
        .into_iter()
        .collect();

        let active = ActiveGraph::from_vars(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(active.params.address(), "core1.internal:7473");
        assert_eq!(active.params.password, "s3cret");
        assert_eq!(active.params.tls_level, TlsLevel::Required);
        assert_eq!(
            active.graph["connection"]["configuration"]["protocols"]["http"]["tlsLevel"],
            "REQUIRED"
        );
        assert_eq!(active.project["name"], "prod");
    }

    #[tokio::test]
    async fn test_file_host_environment_picks_active_graph() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "projects": [{{
                    "name": "Project A",
                    "graphs": [
                        {{"name": "old", "status": "INACTIVE"}},
                        {{"name": "live", "status": "ACTIVE", "connection": {{"configuration": {{
                            "protocols": {{"http": {{"host": "10.0.0.5", "port": "7474",
                                "username": "admin", "password": "pw", "tlsLevel": "REQUIRED"}}}}
                        }}}}}}
                    ]
                }}]
            }}"#
        )
        .unwrap();

        let host = FileHostEnvironment::new(file.path());
        let active = host.first_active().await.unwrap().unwrap();
        assert_eq!(active.graph["name"], "live");
        assert_eq!(active.params.address(), "10.0.0.5:7474");
        assert_eq!(active.params.tls_level, TlsLevel::Required);
        assert_eq!(active.project["name"], "Project A");
    }

    #[tokio::test]
    async fn test_hosted_without_active_graph_is_fatal() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"projects": [{{"name": "p", "graphs": []}}]}}"#).unwrap();

        let source = EnvironmentSource::Hosted(Arc::new(FileHostEnvironment::new(file.path())));
        let err = source.resolve().await.unwrap_err();
        assert!(matches!(
            err,
            crate::errors::MonitorError::Config(ConfigError::NoActiveGraph)
        ));
    }
}
