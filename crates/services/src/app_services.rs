use std::sync::Arc;

use tracing::info;

use roadmap_core::time::Clock;
use storage::repository::Storage;

use crate::error::AppServicesError;
use crate::progress_service::ProgressService;

/// Assembles the progress engine on top of a storage backend.
#[derive(Clone)]
pub struct AppServices {
    storage: Storage,
    progress: Arc<ProgressService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        info!(db_url, "connected progress store");
        Ok(Self::from_storage(storage, clock))
    }

    /// Build services on the in-memory backend, for tests and
    /// prototyping.
    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::from_storage(Storage::in_memory(), clock)
    }

    #[must_use]
    pub fn from_storage(storage: Storage, clock: Clock) -> Self {
        let progress = Arc::new(ProgressService::new(
            clock,
            Arc::clone(&storage.progress),
            Arc::clone(&storage.roadmaps),
        ));
        Self { storage, progress }
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    /// The underlying storage aggregate, for catalog maintenance and
    /// backend-level operations.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}
