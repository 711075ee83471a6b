//! Free-space check run before every disk write

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Smallest amount of free space the cache volume must keep
pub const DEFAULT_MIN_FREE_SPACE: u64 = 50 * 1024 * 1024;

/// Reports free bytes on the volume holding a path
pub trait SpaceProbe: Send + Sync {
    fn available_bytes(&self, path: &Path) -> io::Result<u64>;
}

/// `statvfs`/`GetDiskFreeSpaceEx` via `fs2`
#[derive(Debug, Default, Clone, Copy)]
pub struct FsSpaceProbe;

impl SpaceProbe for FsSpaceProbe {
    fn available_bytes(&self, path: &Path) -> io::Result<u64> {
        fs2::available_space(path)
    }
}

pub struct DiskSpaceGuard {
    dir: PathBuf,
    min_free: u64,
    probe: Box<dyn SpaceProbe>,
    forced_insufficient: AtomicBool,
}

impl DiskSpaceGuard {
    pub fn new(dir: PathBuf, min_free: u64) -> Self {
        Self::with_probe(dir, min_free, Box::new(FsSpaceProbe))
    }

    pub fn with_probe(dir: PathBuf, min_free: u64, probe: Box<dyn SpaceProbe>) -> Self {
        Self {
            dir,
            min_free,
            probe,
            forced_insufficient: AtomicBool::new(false),
        }
    }

    /// Asks the OS every time; free space moves between calls.
    ///
    /// A failed probe counts as "not enough": skipping a best-effort write is
    /// cheaper than filling the volume.
    pub fn has_enough_space(&self) -> bool {
        if self.forced_insufficient.load(Ordering::Relaxed) {
            return false;
        }
        match self.probe.available_bytes(&self.dir) {
            Ok(available) => available >= self.min_free,
            Err(e) => {
                warn!(dir = ?self.dir, error = %e, "Could not read free disk space");
                false
            }
        }
    }

    /// Pretend the volume is full until called again with `false`
    pub fn force_insufficient(&self, forced: bool) {
        self.forced_insufficient.store(forced, Ordering::Relaxed);
    }

    pub fn min_free(&self) -> u64 {
        self.min_free
    }
}
