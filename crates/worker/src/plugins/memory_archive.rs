//! Reference in-memory [`ArchiveHooks`] implementation: holds the
//! rolling metering history in a `Mutex<Vec<ArchiveEntry>>` rather than
//! the durable object-storage location a real deployment would use.

use async_trait::async_trait;
use billing_adapter_core::hooks::ArchiveHooks;
use billing_adapter_shared::config::Config;
use billing_adapter_shared::error::AdapterResult;
use billing_adapter_shared::types::ArchiveEntry;
use tokio::sync::Mutex;

pub struct MemoryArchive {
    location: String,
    entries: Mutex<Vec<ArchiveEntry>>,
}

impl MemoryArchive {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl Default for MemoryArchive {
    fn default() -> Self {
        Self::new("memory://csp-billing-adapter/archive")
    }
}

#[async_trait]
impl ArchiveHooks for MemoryArchive {
    fn archive_location(&self) -> String {
        self.location.clone()
    }

    async fn get_metering_archive(&self, _config: &Config) -> AdapterResult<Vec<ArchiveEntry>> {
        Ok(self.entries.lock().await.clone())
    }

    async fn save_metering_archive(&self, _config: &Config, archive: &[ArchiveEntry]) -> AdapterResult<()> {
        *self.entries.lock().await = archive.to_vec();
        Ok(())
    }
}
