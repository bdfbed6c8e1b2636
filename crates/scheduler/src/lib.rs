//! Job scheduling core: triggers, live-job store, completed-job archive,
//! the dispatcher loop and the HTTP executor.
//!
//! Storage backends: SQLite (`<data_dir>/tocsin.db`), a JSON file pair, or
//! memory.

pub mod clock;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod parse;
pub mod store;
pub mod store_file;
pub mod store_memory;
pub mod store_sqlite;
pub mod trigger;
pub mod types;

pub use {
    dispatcher::{Dispatcher, DispatcherConfig},
    error::{Error, Result},
    executor::{Executor, ReqwestTransport, Transport, TransportError},
    store::{Archive, JobStore},
};

/// Run database migrations for the scheduler tables.
///
/// Creates `jobs` and `completed_jobs`. [`store_sqlite::SqliteStore::new`]
/// calls this; use it directly when sharing a pool.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
