/// Config schema types (server, storage, executor, scheduler).
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TocsinConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub executor: ExecutorConfig,
    pub scheduler: SchedulerConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    /// Port to listen on. Defaults to 8000.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8000,
        }
    }
}

/// Which persistence backend holds live jobs and the completed-job archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    File,
    /// Nothing survives a restart. Useful for local experiments.
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// SQLite connection URL. Defaults to `sqlite://<data_dir>/tocsin.db?mode=rwc`.
    pub database_url: Option<String>,
    /// Directory for the SQLite database or the JSON files. Defaults to the
    /// platform data directory.
    pub data_dir: Option<PathBuf>,
}

/// Outbound HTTP call settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Whole-request timeout in seconds. A timed out call is recorded as a
    /// request error.
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("tocsin/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

/// What to do with a one-time trigger whose fire time already passed when it
/// is created, resumed or updated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatchUpPolicy {
    /// Schedule the firing for "now".
    #[default]
    FireImmediately,
    /// Refuse the operation with an invalid-trigger error.
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub catch_up: CatchUpPolicy,
    /// Upper bound on how long the dispatch loop sleeps when no job is due.
    pub idle_poll_secs: u64,
    /// How long `stop` waits for in-flight executions before giving up.
    pub shutdown_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            catch_up: CatchUpPolicy::default(),
            idle_poll_secs: 60,
            shutdown_grace_secs: 10,
        }
    }
}

impl TocsinConfig {
    /// Resolve the SQLite URL, falling back to a file under `data_dir`.
    #[must_use]
    pub fn database_url(&self, data_dir: &std::path::Path) -> String {
        self.storage.database_url.clone().unwrap_or_else(|| {
            format!("sqlite://{}?mode=rwc", data_dir.join("tocsin.db").display())
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = TocsinConfig::default();
        assert_eq!(cfg.server.port, 8000);
        assert_eq!(cfg.storage.backend, StorageBackend::Sqlite);
        assert_eq!(cfg.scheduler.catch_up, CatchUpPolicy::FireImmediately);
        assert_eq!(cfg.executor.timeout_secs, 30);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: TocsinConfig = toml::from_str(
            r#"
            [scheduler]
            catch_up = "reject"

            [storage]
            backend = "file"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.scheduler.catch_up, CatchUpPolicy::Reject);
        assert_eq!(cfg.scheduler.idle_poll_secs, 60);
        assert_eq!(cfg.storage.backend, StorageBackend::File);
        assert_eq!(cfg.server.bind, "127.0.0.1");
    }

    #[test]
    fn database_url_defaults_under_data_dir() {
        let cfg = TocsinConfig::default();
        let url = cfg.database_url(std::path::Path::new("/var/lib/tocsin"));
        assert_eq!(url, "sqlite:///var/lib/tocsin/tocsin.db?mode=rwc");
    }
}
