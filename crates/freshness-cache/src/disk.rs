//! Disk tier: one entry file per key inside the cache directory
//!
//! Reads go straight to the filesystem. Every mutation (write, remove,
//! conditional expiry, purge) is queued to a single writer task, so
//! operations on the same file apply in the order they were issued.

use crate::codec::{EntryCodec, PREFIX_LEN};
use crate::error::CodecError;
use crate::types::Envelope;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

const ENTRY_EXTENSION: &str = "entry";
const TMP_EXTENSION: &str = "tmp";

enum DiskOp {
    Write {
        path: PathBuf,
        bytes: Vec<u8>,
    },
    Remove {
        path: PathBuf,
        done: oneshot::Sender<()>,
    },
    RemoveIfExpired {
        path: PathBuf,
        now: DateTime<Utc>,
        default_ttl: Duration,
        done: oneshot::Sender<io::Result<bool>>,
    },
    Purge {
        done: oneshot::Sender<io::Result<()>>,
    },
    RemoveOrphanedTmp {
        done: oneshot::Sender<io::Result<usize>>,
    },
    Flush {
        done: oneshot::Sender<()>,
    },
}

/// Queued writes not yet on disk, by target path
type PendingWrites = Arc<Mutex<HashMap<PathBuf, usize>>>;

/// Handle to the on-disk entry files. Cheap to clone; all clones share one writer.
#[derive(Clone)]
pub struct DiskStore {
    dir: PathBuf,
    ops: mpsc::UnboundedSender<DiskOp>,
    pending: PendingWrites,
}

impl DiskStore {
    /// Start the writer task for `dir`. Must be called inside a tokio runtime.
    pub fn spawn(dir: PathBuf) -> Self {
        let (ops, rx) = mpsc::unbounded_channel();
        let pending = PendingWrites::default();
        tokio::spawn(run_writer(dir.clone(), rx, Arc::clone(&pending)));
        Self { dir, ops, pending }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a key: SHA-256 of the key, hex encoded
    pub fn file_name(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        format!("{}.{}", hex::encode(hasher.finalize()), ENTRY_EXTENSION)
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(Self::file_name(key))
    }

    /// Read the raw entry for a key, `None` if there is no file
    pub async fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Committed entry files currently in the directory
    pub async fn entries(&self) -> io::Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION) {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    /// Queue a write. Returns immediately.
    pub fn write(&self, key: &str, bytes: Vec<u8>) {
        let path = self.path_for(key);
        *self.pending.lock().entry(path.clone()).or_insert(0) += 1;
        let op = DiskOp::Write {
            path: path.clone(),
            bytes,
        };
        if self.ops.send(op).is_err() {
            settle_write(&self.pending, &path);
            warn!(key = %key, "Disk writer gone, dropping cache write");
        }
    }

    /// Whether a queued write for `key` has not reached the file yet
    pub fn has_pending_write(&self, key: &str) -> bool {
        self.pending.lock().contains_key(&self.path_for(key))
    }

    /// Remove the entry for a key once all earlier queued work has run
    pub async fn remove(&self, key: &str) {
        let (done, rx) = oneshot::channel();
        let path = self.path_for(key);
        if self.ops.send(DiskOp::Remove { path, done }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Delete `path` if its envelope is expired or unreadable.
    ///
    /// The check runs inside the writer queue, so a write queued before this
    /// call is seen and never deleted by it. Returns whether a file was removed.
    pub async fn remove_if_expired(
        &self,
        path: PathBuf,
        now: DateTime<Utc>,
        default_ttl: Duration,
    ) -> io::Result<bool> {
        let (done, rx) = oneshot::channel();
        let op = DiskOp::RemoveIfExpired {
            path,
            now,
            default_ttl,
            done,
        };
        if self.ops.send(op).is_err() {
            return Err(writer_gone());
        }
        rx.await.unwrap_or_else(|_| Err(writer_gone()))
    }

    /// Delete the whole cache directory and recreate it empty
    pub async fn purge(&self) -> io::Result<()> {
        let (done, rx) = oneshot::channel();
        if self.ops.send(DiskOp::Purge { done }).is_err() {
            return Err(writer_gone());
        }
        rx.await.unwrap_or_else(|_| Err(writer_gone()))
    }

    /// Delete temp files left behind by writes that never reached the rename.
    ///
    /// Runs inside the writer queue, where no write is half done, so every
    /// temp file it finds is orphaned. Returns how many were removed.
    pub async fn remove_orphaned_tmp(&self) -> io::Result<usize> {
        let (done, rx) = oneshot::channel();
        if self.ops.send(DiskOp::RemoveOrphanedTmp { done }).is_err() {
            return Err(writer_gone());
        }
        rx.await.unwrap_or_else(|_| Err(writer_gone()))
    }

    /// Wait for every previously queued operation to finish
    pub async fn flush(&self) {
        let (done, rx) = oneshot::channel();
        if self.ops.send(DiskOp::Flush { done }).is_ok() {
            let _ = rx.await;
        }
    }
}

/// Decode just the envelope of an entry file
pub async fn read_envelope(path: &Path) -> Result<Envelope, CodecError> {
    let mut file = fs::File::open(path).await?;

    let mut prefix = [0u8; PREFIX_LEN];
    read_exact(&mut file, &mut prefix).await?;
    let len = EntryCodec::envelope_len(&prefix)?;

    let mut header = vec![0u8; len];
    read_exact(&mut file, &mut header).await?;
    Ok(serde_json::from_slice(&header)?)
}

async fn read_exact(file: &mut fs::File, buf: &mut [u8]) -> Result<(), CodecError> {
    match file.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(CodecError::Truncated),
        Err(e) => Err(e.into()),
    }
}

fn writer_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "disk writer stopped")
}

fn settle_write(pending: &PendingWrites, path: &Path) {
    let mut pending = pending.lock();
    if let Some(count) = pending.get_mut(path) {
        *count -= 1;
        if *count == 0 {
            pending.remove(path);
        }
    }
}

async fn run_writer(
    dir: PathBuf,
    mut rx: mpsc::UnboundedReceiver<DiskOp>,
    pending: PendingWrites,
) {
    while let Some(op) = rx.recv().await {
        match op {
            DiskOp::Write { path, bytes } => {
                if let Err(e) = write_atomic(&path, &bytes).await {
                    warn!(path = ?path, error = %e, "Failed to persist cache entry");
                }
                settle_write(&pending, &path);
            }
            DiskOp::Remove { path, done } => {
                if let Err(e) = remove_file(&path).await {
                    warn!(path = ?path, error = %e, "Failed to remove cache entry");
                }
                let _ = done.send(());
            }
            DiskOp::RemoveIfExpired {
                path,
                now,
                default_ttl,
                done,
            } => {
                let _ = done.send(remove_if_expired(&path, now, default_ttl).await);
            }
            DiskOp::Purge { done } => {
                let _ = done.send(purge(&dir).await);
            }
            DiskOp::RemoveOrphanedTmp { done } => {
                let _ = done.send(remove_orphaned_tmp(&dir).await);
            }
            DiskOp::Flush { done } => {
                let _ = done.send(());
            }
        }
    }
    debug!(dir = ?dir, "Disk writer stopped");
}

/// Write to a sibling temp file and rename it into place
async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension(TMP_EXTENSION);
    if let Err(e) = fs::write(&tmp, bytes).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    debug!(path = ?path, size = bytes.len(), "Persisted cache entry");
    Ok(())
}

async fn remove_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

async fn remove_if_expired(
    path: &Path,
    now: DateTime<Utc>,
    default_ttl: Duration,
) -> io::Result<bool> {
    match read_envelope(path).await {
        Ok(envelope) if envelope.is_fresh(now, default_ttl) => return Ok(false),
        Ok(_) => {}
        Err(CodecError::Io(e)) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(CodecError::Io(e)) => return Err(e),
        Err(e) => debug!(path = ?path, error = %e, "Removing undecodable cache entry"),
    }
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

async fn remove_orphaned_tmp(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    let mut entries = fs::read_dir(dir).await?;
    while let Some(item) = entries.next_entry().await? {
        let path = item.path();
        if path.extension().and_then(|e| e.to_str()) != Some(TMP_EXTENSION) {
            continue;
        }
        match fs::remove_file(&path).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = ?path, error = %e, "Failed to remove orphaned temp file"),
        }
    }
    if removed > 0 {
        debug!(dir = ?dir, removed, "Removed orphaned temp files");
    }
    Ok(removed)
}

async fn purge(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }
    fs::create_dir_all(dir).await
}
