use std::path::{Path, PathBuf};

use anyhow::Context;
use modelship_publish::ModelshipConfig;

fn home_dir() -> anyhow::Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| anyhow::anyhow!("could not find home directory"))
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(home_dir()?.join(".modelship").join("config.toml"))
}

/// Read the config file, then apply environment overrides.
///
/// An explicit `path` must exist. The default location is optional and
/// falls back to built-in defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<ModelshipConfig> {
    let mut config = match path {
        Some(path) => read_config(path)?,
        None => match default_config_path() {
            Ok(path) if path.exists() => read_config(&path)?,
            _ => ModelshipConfig::default(),
        },
    };
    apply_env(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn read_config(path: &Path) -> anyhow::Result<ModelshipConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
}

pub fn apply_env(config: &mut ModelshipConfig, lookup: impl Fn(&str) -> Option<String>) {
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(token) = var("MODELSHIP_HOST_TOKEN").or_else(|| var("GITHUB_TOKEN")) {
        config.host.token = Some(token);
    }
    if let Some(url) = var("MODELSHIP_API_URL") {
        config.host.api_url = url;
    }
    if let Some(url) = var("MODELSHIP_BACKEND_URL") {
        config.server.backend_url = url;
    }
    if let Some(listen) = var("MODELSHIP_LISTEN") {
        config.server.listen = listen;
    }
}

/// Effective config as TOML, token masked.
pub fn render_config(config: &ModelshipConfig) -> anyhow::Result<String> {
    let printable = ModelshipConfig {
        host: config.host.redacted(),
        ..config.clone()
    };
    Ok(toml::to_string_pretty(&printable)?)
}
