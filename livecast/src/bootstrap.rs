use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use livecast_core::{Config, MuxRegistry, StreamRegistryClient};
use tracing::{info, warn};

/// Resolve and load configuration
///
/// Path priority: `--config` / `LIVECAST_CONFIG_PATH`, then `./livecast.yaml`,
/// then environment variables only.
pub fn load_config(cli_path: Option<&str>) -> Result<Config> {
    let config_path = cli_path
        .filter(|p| Path::new(p).exists())
        .map(str::to_string)
        .or_else(|| {
            let cwd = "livecast.yaml";
            Path::new(cwd).exists().then(|| cwd.to_string())
        });

    if let (Some(requested), None) = (cli_path, config_path.as_deref()) {
        eprintln!("Config file {requested} not found, using environment variables");
    }

    let config = match config_path {
        Some(path) => Config::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Failed to load {path}: {e}"))?,
        None => Config::from_env()?,
    };

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

    Ok(config)
}

/// Registry shared by every command. Missing credentials are not fatal
/// here; each registry call reports them.
pub fn build_registry(config: &Config) -> Result<Arc<dyn StreamRegistryClient>> {
    let registry = MuxRegistry::from_config(&config.mux)?;
    if registry.is_configured() {
        info!(base_url = %config.mux.base_url, "Mux registry configured");
    } else {
        warn!("Running without Mux credentials; stream operations will fail");
    }
    Ok(Arc::new(registry))
}
