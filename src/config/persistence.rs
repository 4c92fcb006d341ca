//! Config file load and validation.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use crate::config::types::{EndpointKind, MonitorConfig};

/// Reject settings the state machine cannot run with.
pub fn validate_config(config: &MonitorConfig) -> Result<()> {
    let discovery = &config.discovery;
    if discovery.min_chunk_size == 0 {
        return Err(anyhow!("discovery.min_chunk_size must be at least 1"));
    }
    if discovery.min_chunk_size > discovery.max_chunk_size {
        return Err(anyhow!(
            "discovery.min_chunk_size ({}) exceeds max_chunk_size ({})",
            discovery.min_chunk_size,
            discovery.max_chunk_size
        ));
    }
    if config.registry.max_sensors == 0 {
        return Err(anyhow!("registry.max_sensors must be at least 1"));
    }
    if config.endpoint.kind == EndpointKind::Emulator && config.endpoint.fixture.is_none() {
        warn!("Emulator endpoint selected without a fixture; pass --fixture <path>");
    }
    Ok(())
}

/// Load configuration from `path`; a missing file yields the defaults.
pub async fn load_config(path: Option<&Path>) -> Result<MonitorConfig> {
    let config = match path {
        Some(path) if path.exists() => {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {:?}", path))?;
            let config: MonitorConfig = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config JSON: {:?}", path))?;
            info!("Loaded configuration from: {:?}", path);
            config
        }
        Some(path) => {
            info!("Config file {:?} not found, using defaults", path);
            MonitorConfig::default()
        }
        None => MonitorConfig::default(),
    };

    validate_config(&config)?;
    Ok(config)
}
