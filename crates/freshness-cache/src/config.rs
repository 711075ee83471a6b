use crate::guard::DEFAULT_MIN_FREE_SPACE;
use crate::types::DEFAULT_TTL;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Cache configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub cache_dir: PathBuf,
    pub default_ttl: Duration,
    pub janitor_interval: Duration,
    /// Bytes that must stay free on the cache volume
    pub min_free_space: u64,
    /// Maximum number of entries held in memory
    pub memory_capacity: u64,
    /// Share one network fetch between concurrent callers for the same key
    pub coalesce_fetches: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache/catalog"),
            default_ttl: DEFAULT_TTL,
            janitor_interval: Duration::from_secs(10 * 60),
            min_free_space: DEFAULT_MIN_FREE_SPACE,
            memory_capacity: 1_000,
            coalesce_fetches: true,
        }
    }
}

impl CacheConfig {
    /// Parse configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cache_dir = env::var("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);

        let default_ttl = env_parse::<u64>("CACHE_DEFAULT_TTL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.default_ttl);

        let janitor_interval = env_parse::<u64>("CACHE_JANITOR_INTERVAL_SECS")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.janitor_interval);

        let min_free_space = env_parse::<u64>("CACHE_MIN_FREE_MB")
            .map(mb_to_bytes)
            .unwrap_or(defaults.min_free_space);

        let memory_capacity =
            env_parse::<u64>("CACHE_MEMORY_CAPACITY").unwrap_or(defaults.memory_capacity);

        let coalesce_fetches =
            env_parse::<bool>("CACHE_COALESCE_FETCHES").unwrap_or(defaults.coalesce_fetches);

        Self {
            cache_dir,
            default_ttl,
            janitor_interval,
            min_free_space,
            memory_capacity,
            coalesce_fetches,
        }
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }
}

fn mb_to_bytes(mb: u64) -> u64 {
    mb.saturating_mul(1024 * 1024)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.default_ttl, Duration::from_secs(600));
        assert_eq!(config.janitor_interval, Duration::from_secs(600));
        assert_eq!(config.min_free_space, 50 * 1024 * 1024);
        assert!(config.coalesce_fetches);
    }

    #[test]
    fn test_with_cache_dir() {
        let config = CacheConfig::default().with_cache_dir("/tmp/elsewhere");
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/elsewhere"));
    }

    #[test]
    fn test_free_space_megabytes_saturate() {
        assert_eq!(mb_to_bytes(50), 50 * 1024 * 1024);
        assert_eq!(mb_to_bytes(u64::MAX), u64::MAX);
        assert_eq!(mb_to_bytes(u64::MAX / (1024 * 1024) + 1), u64::MAX);
    }

    #[test]
    fn test_env_parse_rejects_garbage() {
        assert_eq!(env_parse::<u64>("FRESHNESS_CACHE_TEST_UNSET_VARIABLE"), None);
    }
}
