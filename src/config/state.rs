// Application state module
// Shared, read-mostly state handed to every connection

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use super::types::Config;
use crate::output::ViewResponder;
use crate::upload::UploadStaging;

/// Application state
pub struct AppState {
    pub config: Config,

    // Cached config values for fast access without locks
    pub cached_access_log: Arc<AtomicBool>,

    /// Views for server-rendered pages
    pub views: ViewResponder,
}

impl AppState {
    pub fn new(config: &Config, views: ViewResponder) -> Self {
        Self {
            config: config.clone(),
            cached_access_log: Arc::new(AtomicBool::new(config.logging.access_log)),
            views,
        }
    }

    /// Fresh upload staging context for one request
    pub fn upload_staging(&self) -> UploadStaging {
        self.config
            .uploads
            .temp_dir
            .as_ref()
            .map_or_else(UploadStaging::new, |root| {
                UploadStaging::in_root(PathBuf::from(root))
            })
    }
}
