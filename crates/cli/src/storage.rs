use std::sync::Arc;

use {
    anyhow::Context,
    tocsin_config::{StorageBackend, TocsinConfig},
    tocsin_scheduler::{
        Archive, JobStore, store_file::FileStore, store_memory::InMemoryStore,
        store_sqlite::SqliteStore,
    },
    tracing::info,
};

/// The live-job store and the archive. Every backend serves both.
pub struct Storage {
    pub jobs: Arc<dyn JobStore>,
    pub archive: Arc<dyn Archive>,
}

impl Storage {
    fn shared<S: JobStore + Archive + 'static>(store: S) -> Self {
        let store = Arc::new(store);
        Self {
            jobs: store.clone(),
            archive: store,
        }
    }
}

pub async fn open(config: &TocsinConfig) -> anyhow::Result<Storage> {
    let data_dir = tocsin_config::data_dir(config);

    match config.storage.backend {
        StorageBackend::Sqlite => {
            let url = config.database_url(&data_dir);
            if config.storage.database_url.is_none() {
                std::fs::create_dir_all(&data_dir).with_context(|| {
                    format!("failed to create data dir {}", data_dir.display())
                })?;
            }
            info!(url = %url, "opening sqlite store");
            let store = SqliteStore::new(&url)
                .await
                .with_context(|| format!("failed to open {url}"))?;
            Ok(Storage::shared(store))
        },
        StorageBackend::File => {
            info!(dir = %data_dir.display(), "using file store");
            Ok(Storage::shared(FileStore::in_dir(&data_dir)))
        },
        StorageBackend::Memory => {
            info!("using in-memory store, nothing will be persisted");
            Ok(Storage::shared(InMemoryStore::new()))
        },
    }
}
