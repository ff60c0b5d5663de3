//! Structure Store
//!
//! A versioned structure store for software landscapes:
//! - Ingests repository states, commits, file details and runtime spans
//! - Keeps a commit-scoped file tree per repository with content-hash identity
//! - Projects commits into flat city/district/building landscapes
//! - Reconstructs branches and branch points for commit-tree views

pub mod api;
pub mod ingest;
pub mod query;
pub mod store;
pub mod structure;

#[cfg(test)]
pub(crate) mod test_helpers;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: ServerYamlConfig,
    pub store: StoreYamlConfig,
}

/// Server configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerYamlConfig {
    pub port: u16,
}

impl Default for ServerYamlConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// Store configuration section
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StoreYamlConfig {
    /// JSON snapshot written after every ingestion; in-memory only when unset
    pub snapshot_path: Option<PathBuf>,
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub snapshot_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        Ok(Self {
            server_port: std::env::var("SERVER_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(yaml.server.port),
            snapshot_path: std::env::var("STORE_SNAPSHOT_PATH")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .or(yaml.store.snapshot_path),
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn store::GraphStore>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Open the store, restoring the snapshot when one is configured
    pub async fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn store::GraphStore> = match &config.snapshot_path {
            Some(path) => Arc::new(store::MemoryGraphStore::open(path).await?),
            None => Arc::new(store::MemoryGraphStore::new()),
        };

        Ok(Self {
            store,
            config: Arc::new(config),
        })
    }
}

/// Serve the HTTP API until the process is stopped
pub async fn start_server(config: Config) -> Result<()> {
    let state = AppState::new(config).await?;
    let port = state.config.server_port;

    let server_state = Arc::new(api::ServerState::new(state.store.clone()));
    let app = api::create_router(server_state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Structure store listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // last write wins over any flush still racing the shutdown
    state.store.flush().await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Tests
// ============================================================================
