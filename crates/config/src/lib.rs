//! Configuration loading, validation, and env substitution.
//!
//! Config files: `tocsin.toml`, `tocsin.yaml`, or `tocsin.json`
//! Searched in `./` then `~/.config/tocsin/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{apply_env_overrides, config_dir, data_dir, discover_and_load, load_config},
    schema::{
        CatchUpPolicy, ExecutorConfig, SchedulerConfig, ServerConfig, StorageBackend,
        StorageConfig, TocsinConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult},
};
