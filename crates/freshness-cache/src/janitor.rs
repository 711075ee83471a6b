//! Periodic sweep that deletes expired entry files
//!
//! Runs independently of reads and writes and only ever looks at the disk
//! tier. Each file is judged by its envelope alone; payloads are never decoded.

use crate::clock::Clock;
use crate::disk::{read_envelope, DiskStore};
use crate::types::SweepReport;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// `tokio::time::interval` rejects a zero period
const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Clone)]
pub struct Janitor {
    disk: DiskStore,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    interval: Duration,
}

impl Janitor {
    pub fn new(
        disk: DiskStore,
        clock: Arc<dyn Clock>,
        default_ttl: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            disk,
            clock,
            default_ttl,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One pass over every entry file. A file that can't be removed is
    /// counted and skipped; it never stops the rest of the sweep.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let paths = match self.disk.entries().await {
            Ok(paths) => paths,
            Err(e) => {
                warn!(dir = ?self.disk.dir(), error = %e, "Janitor could not list cache directory");
                return report;
            }
        };

        let now = self.clock.now();
        for path in paths {
            report.scanned += 1;

            match read_envelope(&path).await {
                Ok(envelope) if envelope.is_fresh(now, self.default_ttl) => continue,
                Ok(envelope) => debug!(key = %envelope.key, "Expired cache entry"),
                Err(e) => debug!(path = ?path, error = %e, "Unreadable cache entry"),
            }

            match self
                .disk
                .remove_if_expired(path.clone(), now, self.default_ttl)
                .await
            {
                Ok(true) => report.removed += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(path = ?path, error = %e, "Janitor failed to remove cache entry");
                }
            }
        }

        match self.disk.remove_orphaned_tmp().await {
            Ok(count) => report.tmp_removed = count,
            Err(e) => warn!(dir = ?self.disk.dir(), error = %e, "Janitor could not clear temp files"),
        }

        if report.removed > 0 || report.failed > 0 || report.tmp_removed > 0 {
            info!(
                scanned = report.scanned,
                removed = report.removed,
                failed = report.failed,
                tmp_removed = report.tmp_removed,
                "Janitor sweep finished"
            );
        } else {
            debug!(scanned = report.scanned, "Janitor sweep finished");
        }
        report
    }

    /// Sweep every `interval` until the handle is shut down
    pub fn spawn(self) -> JanitorHandle {
        let task = tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick fires immediately; the first sweep waits a full period
            ticker.tick().await;

            loop {
                ticker.tick().await;
                self.sweep().await;
            }
        });
        JanitorHandle { task }
    }
}

/// Running janitor task
pub struct JanitorHandle {
    task: JoinHandle<()>,
}

impl JanitorHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}
