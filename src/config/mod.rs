mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./livetail.toml",
        "~/.config/livetail/config.toml",
        "/etc/livetail/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.origin.capability_header.trim().is_empty() {
        anyhow::bail!("origin.capability_header cannot be empty");
    }

    if let Some(base_url) = &config.origin.base_url {
        let url = reqwest::Url::parse(base_url)
            .with_context(|| format!("Invalid origin.base_url: {}", base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("origin.base_url must be http or https, got {}", url.scheme());
        }
    }

    if config.locator.upper_bound_bytes == 0 {
        anyhow::bail!("locator.upper_bound_bytes cannot be 0");
    }

    if config.reader.max_fetch_attempts == Some(0) {
        anyhow::bail!("reader.max_fetch_attempts must be at least 1");
    }

    if config.intercept.extensions.is_empty() {
        tracing::warn!("intercept.extensions is empty; only Sec-Fetch-Dest: video requests will be streamed live");
    }

    Ok(())
}
