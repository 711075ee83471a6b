//! Two-tier TTL cache with stale-while-revalidate fetching
//!
//! Entries live in a bounded in-memory map in front of one file per key in a
//! cache directory. [`CacheStore`] is the facade over both tiers;
//! [`FetchOrchestrator`] layers the cached-then-network policy on top of it.
//! A [`Janitor`] sweeps expired files in the background and a
//! [`MemoryPressureReactor`] sheds the memory tier on request.

pub mod clock;
pub mod codec;
pub mod config;
pub mod disk;
pub mod error;
pub mod guard;
pub mod janitor;
pub mod memory;
pub mod orchestrator;
pub mod pressure;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::EntryCodec;
pub use config::CacheConfig;
pub use disk::DiskStore;
pub use error::{CacheError, CodecError, Result};
pub use guard::{DiskSpaceGuard, FsSpaceProbe, SpaceProbe, DEFAULT_MIN_FREE_SPACE};
pub use janitor::{Janitor, JanitorHandle};
pub use memory::MemoryStore;
pub use orchestrator::{fan_in, FetchOrchestrator};
pub use pressure::{LowMemoryWarning, MemoryPressureReactor};
pub use store::CacheStore;
pub use types::{CacheEntry, CacheStats, Envelope, SweepReport, DEFAULT_TTL};
