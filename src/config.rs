//! Review configuration helpers.
//!
//! Settings come from four layers, strongest first: command-line flags, a
//! JSON config file, `DERISK_*` environment variables, then built-in
//! defaults. The config file is optional; everything has a usable default
//! except where validation says otherwise.

use crate::state::{RATING_MAX, RATING_MIN};
use crate::strategy::Strategy;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Current schema version for the config file.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_MODEL: &str = "llama3.2";
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";
pub const DEFAULT_MAX_ITERATIONS: u32 = 2;

/// On-disk config shape. All fields beyond the schema version are optional
/// so a stub can be trimmed down to only the overrides a user cares about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lm_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_gate: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions_root: Option<PathBuf>,
}

/// Flag-level overrides, strongest layer in the resolution order.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub lm_command: Option<String>,
    pub max_iterations: Option<u32>,
    pub strategy: Option<Strategy>,
    pub rating_gate: Option<u8>,
    pub sessions_root: Option<PathBuf>,
}

/// Fully resolved settings a review run actually uses.
#[derive(Debug, Clone)]
pub struct Settings {
    pub model: String,
    pub endpoint: String,
    pub lm_command: Option<String>,
    pub max_iterations: u32,
    pub strategy: Strategy,
    pub rating_gate: Option<u8>,
    pub sessions_root: Option<PathBuf>,
}

/// Build the default config used for stubs.
pub fn default_config() -> ReviewConfig {
    ReviewConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        model: Some(DEFAULT_MODEL.to_string()),
        endpoint: Some(DEFAULT_ENDPOINT.to_string()),
        lm_command: None,
        max_iterations: Some(DEFAULT_MAX_ITERATIONS),
        strategy: Some(Strategy::Default),
        rating_gate: None,
        sessions_root: None,
    }
}

/// Render a pretty JSON config stub for new setups or edit suggestions.
pub fn config_stub() -> String {
    let config = default_config();
    serde_json::to_string_pretty(&config).expect("serialize config stub")
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<ReviewConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: ReviewConfig =
        serde_json::from_slice(&bytes).context("parse review config JSON")?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate config schema and value ranges.
pub fn validate_config(config: &ReviewConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported review config schema_version {}",
            config.schema_version
        ));
    }
    if let Some(model) = config.model.as_deref() {
        if model.trim().is_empty() {
            return Err(anyhow!("model must be non-empty"));
        }
    }
    if let Some(endpoint) = config.endpoint.as_deref() {
        if endpoint.trim().is_empty() {
            return Err(anyhow!("endpoint must be non-empty"));
        }
    }
    if let Some(gate) = config.rating_gate {
        if !(RATING_MIN..=RATING_MAX).contains(&gate) {
            return Err(anyhow!(
                "rating_gate must be between {RATING_MIN} and {RATING_MAX} (got {gate})"
            ));
        }
    }
    Ok(())
}

/// Resolve settings from flags, config, and the process environment.
pub fn resolve(overrides: &Overrides, config: Option<&ReviewConfig>) -> Result<Settings> {
    resolve_with_env(overrides, config, &|name| std::env::var(name).ok())
}

/// Resolution with an injectable environment, so tests stay hermetic.
pub fn resolve_with_env(
    overrides: &Overrides,
    config: Option<&ReviewConfig>,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<Settings> {
    let model = overrides
        .model
        .clone()
        .or_else(|| config.and_then(|c| c.model.clone()))
        .or_else(|| env("DERISK_MODEL"))
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    if model.trim().is_empty() {
        return Err(anyhow!("model must be non-empty"));
    }

    let endpoint = overrides
        .endpoint
        .clone()
        .or_else(|| config.and_then(|c| c.endpoint.clone()))
        .or_else(|| env("DERISK_ENDPOINT"))
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
    if endpoint.trim().is_empty() {
        return Err(anyhow!("endpoint must be non-empty"));
    }

    let lm_command = overrides
        .lm_command
        .clone()
        .or_else(|| config.and_then(|c| c.lm_command.clone()))
        .or_else(|| env("DERISK_LM_COMMAND"));

    let max_iterations = match overrides
        .max_iterations
        .or_else(|| config.and_then(|c| c.max_iterations))
    {
        Some(n) => n,
        None => match env("DERISK_MAX_ITERATIONS") {
            Some(raw) => raw
                .parse::<u32>()
                .with_context(|| format!("parse DERISK_MAX_ITERATIONS {raw:?}"))?,
            None => DEFAULT_MAX_ITERATIONS,
        },
    };

    let strategy = match overrides
        .strategy
        .or_else(|| config.and_then(|c| c.strategy))
    {
        Some(strategy) => strategy,
        None => match env("DERISK_STRATEGY") {
            Some(raw) => Strategy::from_str(&raw)?,
            None => Strategy::Default,
        },
    };

    let rating_gate = overrides
        .rating_gate
        .or_else(|| config.and_then(|c| c.rating_gate));
    if let Some(gate) = rating_gate {
        if !(RATING_MIN..=RATING_MAX).contains(&gate) {
            return Err(anyhow!(
                "rating gate must be between {RATING_MIN} and {RATING_MAX} (got {gate})"
            ));
        }
    }

    let sessions_root = overrides
        .sessions_root
        .clone()
        .or_else(|| config.and_then(|c| c.sessions_root.clone()));

    Ok(Settings {
        model,
        endpoint,
        lm_command,
        max_iterations,
        strategy,
        rating_gate,
        sessions_root,
    })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
