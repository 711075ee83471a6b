use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Shared "is the device online" flag.
///
/// Clones observe the same state. The host flips it from its own reachability
/// source; the HTTP client reads it before every request.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    state: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        Self {
            state: Arc::new(watch::Sender::new(online)),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    pub fn set_online(&self, online: bool) {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if changed {
            info!(online, "Connectivity changed");
        }
    }

    /// Receive every change of state
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
