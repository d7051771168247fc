use anyhow::{Context, Result};
use orchestrator::EchoConfig;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "cellular-echo.toml";

/// Load settings from `path`, or from [`DEFAULT_CONFIG_FILE`] in the
/// working directory when it exists, or fall back to defaults.
pub async fn load(path: Option<&Path>) -> Result<EchoConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let default = std::env::current_dir()?.join(DEFAULT_CONFIG_FILE);
            if !default.exists() {
                return Ok(EchoConfig::default());
            }
            default
        }
    };

    let content = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: EchoConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    tracing::debug!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Write the default settings to `path`. Returns `false` if the file
/// exists and `force` is not set.
pub async fn write_default(path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = toml::to_string_pretty(&EchoConfig::default())?;
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write config file {}", path.display()))?;
    Ok(true)
}
