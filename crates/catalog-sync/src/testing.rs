//! Test doubles shared by the service tests

use async_trait::async_trait;
use catalog_client::{ApiError, CatalogApi, Collection, CollectionSort, Nft, Order, Profile};
use freshness_cache::{CacheConfig, CacheStore, DiskSpaceGuard, FetchOrchestrator, ManualClock};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// In-memory `CatalogApi` that counts calls.
///
/// Every response carries `version` so tests can tell a cached value from a
/// fresh one.
#[derive(Default)]
pub(crate) struct FakeApi {
    pub calls: AtomicUsize,
    pub nft_requests: Mutex<Vec<String>>,
    pub version: AtomicUsize,
    pub offline: AtomicBool,
    /// NFT ids that answer 404
    pub missing_nfts: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn bump_version(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    fn begin(&self) -> Result<String, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(ApiError::Offline);
        }
        Ok(format!("v{}", self.version.load(Ordering::SeqCst)))
    }
}

#[async_trait]
impl CatalogApi for FakeApi {
    async fn collections(
        &self,
        page: u32,
        sort: CollectionSort,
    ) -> Result<Vec<Collection>, ApiError> {
        let version = self.begin()?;
        Ok(vec![Collection {
            id: format!("page{page}"),
            name: format!("{sort} {version}"),
            description: None,
            cover_url: None,
            author: None,
            nft_ids: vec![],
        }])
    }

    async fn profile(&self, id: &str) -> Result<Profile, ApiError> {
        let version = self.begin()?;
        Ok(Profile {
            id: id.to_string(),
            name: version,
            avatar_url: None,
            description: None,
            website: None,
            nft_ids: vec![],
            likes: vec![],
        })
    }

    async fn order(&self, id: &str) -> Result<Order, ApiError> {
        let version = self.begin()?;
        Ok(Order {
            id: id.to_string(),
            nft_ids: vec![version],
        })
    }

    async fn nft(&self, id: &str) -> Result<Nft, ApiError> {
        let version = self.begin()?;
        self.nft_requests.lock().push(id.to_string());
        if self.missing_nfts.lock().iter().any(|missing| missing == id) {
            return Err(ApiError::Status(404));
        }
        Ok(Nft {
            id: id.to_string(),
            name: version,
            images: vec![],
            rating: 3,
            price: 0.5,
            author: None,
        })
    }
}

pub(crate) fn cache_config(dir: &Path) -> CacheConfig {
    let mut config = CacheConfig::default().with_cache_dir(dir.join("cache"));
    config.min_free_space = 0;
    config
}

pub(crate) async fn orchestrator(dir: &Path) -> Arc<FetchOrchestrator> {
    let config = cache_config(dir);
    let guard = DiskSpaceGuard::new(config.cache_dir.clone(), 0);
    let store =
        CacheStore::open_with_guard(&config, Arc::new(ManualClock::default()), guard).await;
    Arc::new(FetchOrchestrator::new(Arc::new(store), true))
}
