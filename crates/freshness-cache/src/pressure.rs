//! Reaction to the application's low-memory signal

use crate::janitor::Janitor;
use crate::store::CacheStore;
use crate::types::SweepReport;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Broadcast by the host when the process is asked to shed memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowMemoryWarning;

/// Empties the memory tier, disables further saves, and runs one janitor
/// sweep. Saves stay disabled until `CacheStore::enable_caching` is called.
pub struct MemoryPressureReactor {
    store: Arc<CacheStore>,
    janitor: Option<Janitor>,
}

impl MemoryPressureReactor {
    pub fn new(store: Arc<CacheStore>, janitor: Option<Janitor>) -> Self {
        Self { store, janitor }
    }

    pub async fn handle_low_memory(&self) -> Option<SweepReport> {
        self.store.handle_memory_pressure();
        match &self.janitor {
            Some(janitor) => Some(janitor.sweep().await),
            None => None,
        }
    }

    /// Handle warnings until every sender is dropped
    pub fn spawn(self, mut warnings: broadcast::Receiver<LowMemoryWarning>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match warnings.recv().await {
                    Ok(LowMemoryWarning) => {
                        self.handle_low_memory().await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Repeated warnings collapse into one reset
                        warn!(skipped, "Low-memory warnings lagged");
                        self.handle_low_memory().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Memory pressure reactor stopped");
        })
    }
}
