//! NDI source discovery backing the `list_sources` / `refresh_sources`
//! control operations.

use std::sync::Arc;
use std::time::Duration;

use grafton_ndi::{Finder, FinderOptions, NDI};
use log::info;
use parking_lot::Mutex;

use super::source::SourceError;

/// Cached view of discoverable NDI sources.
///
/// `list` returns the names from the last discovery pass; `refresh` runs a
/// new pass. A finder is created per refresh and dropped afterwards, so the
/// directory holds no long-lived borrow of the runtime.
pub struct SourceDirectory {
    ndi: Arc<NDI>,
    cached: Mutex<Vec<String>>,
}

impl SourceDirectory {
    pub fn new(ndi: Arc<NDI>) -> Self {
        Self {
            ndi,
            cached: Mutex::new(Vec::new()),
        }
    }

    /// Names from the most recent discovery pass
    pub fn list(&self) -> Vec<String> {
        self.cached.lock().clone()
    }

    /// Run discovery bounded by `timeout` and return the refreshed list.
    pub fn refresh(&self, timeout: Duration) -> Result<Vec<String>, SourceError> {
        let options = FinderOptions::builder().show_local_sources(true).build();
        let finder =
            Finder::new(&self.ndi, &options).map_err(|e| SourceError::Connect(e.to_string()))?;

        let _ = finder.wait_for_sources(timeout.as_millis() as u32);
        let sources = finder
            .get_sources(timeout.as_millis() as u32)
            .map_err(|e| SourceError::Connect(e.to_string()))?;

        let names: Vec<String> = sources.iter().map(|s| s.to_string()).collect();
        info!("NDI discovery found {} source(s)", names.len());

        *self.cached.lock() = names.clone();
        Ok(names)
    }
}
