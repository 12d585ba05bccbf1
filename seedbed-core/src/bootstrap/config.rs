//! Configuration loading

use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::config::RunEnvironment;
use crate::Config;

const CONFIG_PATH_ENV: &str = "SEEDBED_CONFIG_PATH";
const CWD_CONFIG: &str = "seedbed.yaml";
const SYSTEM_CONFIG: &str = "/etc/seedbed/config.yaml";

/// Load configuration from a config file and environment variables
///
/// Config file search order:
/// 1. `explicit` (e.g. `--config`); it must exist
/// 2. SEEDBED_CONFIG_PATH environment variable
/// 3. ./seedbed.yaml (current working directory)
/// 4. /etc/seedbed/config.yaml
/// 5. Environment variables only
///
/// Unlike a long-running server there is nothing sensible to fall back to,
/// so a broken file or a failed validation is an error.
pub fn load_config(explicit: Option<&str>) -> Result<Config> {
    let config_path = resolve_config_path(explicit)?;

    let config = match &config_path {
        Some(path) => {
            eprintln!("Loading config from {path}");
            Config::from_file(path)
                .map_err(|e| anyhow::anyhow!("Failed to load config from {path}: {e}"))?
        }
        None => {
            eprintln!("No config file found, using environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {e}"))?
        }
    };

    // Logging is not installed yet, so repeat the lenient-parse warning here
    if let Ok(name) = std::env::var("APP_ENV") {
        if !name.trim().is_empty() && name.trim().parse::<RunEnvironment>().is_err() {
            eprintln!("Unrecognised APP_ENV '{name}', running as {}", config.environment);
        }
    }

    // Validate configuration (fail fast on misconfigurations)
    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Config validation error: {error}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    info!("Configuration loaded and validated successfully");

    Ok(config)
}

fn resolve_config_path(explicit: Option<&str>) -> Result<Option<String>> {
    if let Some(path) = explicit {
        if !Path::new(path).exists() {
            return Err(anyhow::anyhow!("Config file {path} does not exist"));
        }
        return Ok(Some(path.to_string()));
    }

    Ok(std::env::var(CONFIG_PATH_ENV)
        .ok()
        .filter(|p| Path::new(p).exists())
        .or_else(|| [CWD_CONFIG, SYSTEM_CONFIG]
            .into_iter()
            .find(|p| Path::new(p).exists())
            .map(str::to_string)))
}
