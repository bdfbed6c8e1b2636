use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::TocsinConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["tocsin.toml", "tocsin.yaml", "tocsin.yml", "tocsin.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<TocsinConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./tocsin.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/tocsin/tocsin.{toml,yaml,yml,json}` (user-global)
///
/// Returns `TocsinConfig::default()` if no config file is found.
pub fn discover_and_load() -> TocsinConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    TocsinConfig::default()
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/tocsin/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "tocsin").map(|d| d.config_dir().to_path_buf())
}

/// Returns the directory holding persisted jobs.
///
/// `storage.data_dir` wins; otherwise the platform data directory, falling back
/// to `./data`.
pub fn data_dir(config: &TocsinConfig) -> PathBuf {
    if let Some(dir) = &config.storage.data_dir {
        return dir.clone();
    }
    directories::ProjectDirs::from("", "", "tocsin")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("data"))
}

/// Apply `TOCSIN_*` environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: &mut TocsinConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(config: &mut TocsinConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(bind) = lookup("TOCSIN_BIND") {
        config.server.bind = bind;
    }
    if let Some(port) = lookup("TOCSIN_PORT") {
        match port.parse() {
            Ok(port) => config.server.port = port,
            Err(e) => warn!(value = %port, error = %e, "ignoring invalid TOCSIN_PORT"),
        }
    }
    if let Some(url) = lookup("TOCSIN_DATABASE_URL") {
        config.storage.database_url = Some(url);
    }
    if let Some(dir) = lookup("TOCSIN_DATA_DIR") {
        config.storage.data_dir = Some(PathBuf::from(dir));
    }
}

pub(crate) fn parse_config(raw: &str, path: &Path) -> anyhow::Result<TocsinConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
