pub mod constraints;
pub mod evaluate;
pub mod metrics;
pub mod validate;

use std::path::Path;

use anyhow::{Context, Result};

use cogbench_core::registry::Registry;
use cogbench_oracle::config::{load_config_from, CogbenchConfig};

/// Load the config and build the registry it describes.
pub fn load_config_and_registry(path: Option<&Path>) -> Result<(CogbenchConfig, Registry)> {
    let config = load_config_from(path)?;
    let registry = Registry::from_config(config.settings.registry.clone())
        .context("invalid registry configuration")?;
    Ok((config, registry))
}

pub fn percent(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}
