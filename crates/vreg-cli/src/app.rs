//! Application state management.

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use vreg_core::{Config, JsonFileSource, RecordSource, SearchController, SyncManager, TimeoutSource};

/// Shared application state.
pub struct App {
    /// Configuration
    pub config: Config,

    /// Record file backing the store
    pub data_file: PathBuf,

    /// Mirror owner
    pub sync: Arc<SyncManager>,

    /// Search over the mirror
    pub controller: SearchController,
}

impl App {
    /// Create a new application instance and load the mirror.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let data_file = config.data_file()?;

        let json: Arc<dyn RecordSource> = Arc::new(JsonFileSource::new(data_file.clone()));
        let source: Arc<dyn RecordSource> = match config.sync.fetch_timeout() {
            Some(timeout) => Arc::new(TimeoutSource::new(json, timeout)),
            None => json,
        };

        let sync = Arc::new(SyncManager::new(source, config.sync.clone()));
        let controller = SearchController::new(Arc::clone(&sync), config.search.clone(), &config.cache)?;
        controller
            .initialize()
            .with_context(|| format!("loading records from {}", data_file.display()))?;

        info!(
            data_file = %data_file.display(),
            records = sync.record_count(),
            "Application initialized"
        );

        Ok(App {
            config,
            data_file,
            sync,
            controller,
        })
    }
}
