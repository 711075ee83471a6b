//! Cache types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// TTL applied to entries saved without one
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

/// A cached payload with the metadata needed to judge its freshness
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub payload: T,
    /// Set by the store at save time
    pub stored_at: DateTime<Utc>,
    /// `None` means the store's default TTL, not "never expires"
    pub ttl: Option<Duration>,
}

impl<T> CacheEntry<T> {
    pub fn is_fresh(&self, now: DateTime<Utc>, default_ttl: Duration) -> bool {
        is_fresh(self.stored_at, self.ttl, now, default_ttl)
    }

    pub(crate) fn envelope(&self, key: &str) -> Envelope {
        Envelope {
            key: key.to_string(),
            stored_at: self.stored_at,
            ttl_ms: self.ttl.map(|ttl| ttl.as_millis().min(u64::MAX as u128) as u64),
        }
    }
}

/// Timestamp and TTL metadata stored ahead of the payload on disk.
///
/// Decodable without knowing the payload type, which is what lets the
/// janitor sweep entries it has no type information for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub key: String,
    pub stored_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,
}

impl Envelope {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_ms.map(Duration::from_millis)
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, default_ttl: Duration) -> bool {
        is_fresh(self.stored_at, self.ttl(), now, default_ttl)
    }
}

/// `now - stored_at < ttl`, with entries stamped in the future counted as age zero
pub fn is_fresh(
    stored_at: DateTime<Utc>,
    ttl: Option<Duration>,
    now: DateTime<Utc>,
    default_ttl: Duration,
) -> bool {
    let ttl = ttl.unwrap_or(default_ttl);
    let age = (now - stored_at).to_std().unwrap_or(Duration::ZERO);
    age < ttl
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub memory_entries: u64,
    pub hits: u64,
    pub misses: u64,
    pub writes_skipped: u64,
}

/// Outcome of one janitor pass over the disk tier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub failed: usize,
    /// Temp files of interrupted writes that were reclaimed
    pub tmp_removed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_within_ttl() {
        let stored = Utc::now();
        let now = stored + chrono::Duration::seconds(599);
        assert!(is_fresh(stored, Some(Duration::from_secs(600)), now, DEFAULT_TTL));
    }

    #[test]
    fn test_stale_at_exact_ttl() {
        let stored = Utc::now();
        let now = stored + chrono::Duration::seconds(600);
        assert!(!is_fresh(stored, Some(Duration::from_secs(600)), now, DEFAULT_TTL));
    }

    #[test]
    fn test_missing_ttl_uses_default() {
        let stored = Utc::now();
        let short_default = Duration::from_secs(5);
        let now = stored + chrono::Duration::seconds(6);
        assert!(!is_fresh(stored, None, now, short_default));
        assert!(is_fresh(stored, None, now, DEFAULT_TTL));
    }

    #[test]
    fn test_future_timestamp_counts_as_fresh() {
        let now = Utc::now();
        let stored = now + chrono::Duration::seconds(30);
        assert!(is_fresh(stored, Some(Duration::from_secs(1)), now, DEFAULT_TTL));
    }

    #[test]
    fn test_envelope_ttl_round_trips_through_millis() {
        let entry = CacheEntry {
            payload: "x",
            stored_at: Utc::now(),
            ttl: Some(Duration::from_millis(1500)),
        };
        let envelope = entry.envelope("profile");
        assert_eq!(envelope.key, "profile");
        assert_eq!(envelope.ttl(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_envelope_without_ttl_omits_field() {
        let envelope = Envelope {
            key: "k".to_string(),
            stored_at: Utc::now(),
            ttl_ms: None,
        };
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(!json.contains("ttl_ms"));
    }
}
