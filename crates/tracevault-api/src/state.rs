//! Application state shared across all route handlers.

use std::path::PathBuf;
use std::sync::Arc;

use tracevault_core::config::TraceVaultConfig;
use tracevault_pipeline::JobQueue;
use tracevault_storage::Database;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks. The
/// handlers only read the Evidence Store; writes happen in workers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<TraceVaultConfig>,
    /// SQLite Evidence Store.
    pub database: Arc<Database>,
    /// Orchestration job queue.
    pub queue: Arc<dyn JobQueue>,
    /// Directory uploads are written to.
    pub upload_dir: PathBuf,
}

impl AppState {
    pub fn new(
        config: TraceVaultConfig,
        database: Arc<Database>,
        queue: Arc<dyn JobQueue>,
        upload_dir: PathBuf,
    ) -> Self {
        Self {
            config: Arc::new(config),
            database,
            queue,
            upload_dir,
        }
    }
}
