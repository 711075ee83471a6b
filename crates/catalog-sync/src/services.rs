//! Wiring of the cache, the API client and the per-domain services

use crate::collections::CollectionsService;
use crate::error::Result;
use crate::nfts::NftService;
use crate::orders::OrderService;
use crate::profile::ProfileService;
use crate::sort::SortOptionStore;
use catalog_client::{ApiConfig, CatalogApi, ConnectivityMonitor, HttpCatalogApi};
use freshness_cache::{
    CacheConfig, CacheStore, Clock, FetchOrchestrator, Janitor, JanitorHandle, LowMemoryWarning,
    MemoryPressureReactor, SystemClock,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

/// Every data service over one shared cache.
///
/// Owns the background janitor and memory-pressure tasks; call
/// [`CatalogServices::shutdown`] to stop them and drain pending disk writes.
pub struct CatalogServices {
    pub collections: CollectionsService,
    pub profile: ProfileService,
    pub orders: OrderService,
    pub nfts: NftService,
    store: Arc<CacheStore>,
    connectivity: ConnectivityMonitor,
    low_memory: broadcast::Sender<LowMemoryWarning>,
    janitor: Option<JanitorHandle>,
    reactor: JoinHandle<()>,
}

impl CatalogServices {
    pub async fn build(cache_config: &CacheConfig, api_config: &ApiConfig) -> Result<Self> {
        let connectivity = ConnectivityMonitor::default();
        let api = Arc::new(HttpCatalogApi::new(api_config, connectivity.clone())?);
        Ok(Self::with_api(cache_config, api_config, api, connectivity, Arc::new(SystemClock)).await)
    }

    pub async fn with_api(
        cache_config: &CacheConfig,
        api_config: &ApiConfig,
        api: Arc<dyn CatalogApi>,
        connectivity: ConnectivityMonitor,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = Arc::new(CacheStore::open(cache_config, clock).await);
        let orchestrator = Arc::new(FetchOrchestrator::new(
            Arc::clone(&store),
            cache_config.coalesce_fetches,
        ));
        let sort = Arc::new(SortOptionStore::default());

        let janitor = store.janitor(cache_config.janitor_interval);
        let (low_memory, warnings) = broadcast::channel(8);
        let reactor = MemoryPressureReactor::new(Arc::clone(&store), janitor.clone()).spawn(warnings);
        let janitor = janitor.map(Janitor::spawn);

        info!(
            cache_dir = ?cache_config.cache_dir,
            catalog = store.has_catalog(),
            coalesce = cache_config.coalesce_fetches,
            "Catalog services ready"
        );

        Self {
            collections: CollectionsService::new(Arc::clone(&orchestrator), Arc::clone(&api), sort),
            profile: ProfileService::new(
                Arc::clone(&orchestrator),
                Arc::clone(&api),
                api_config.profile_id.clone(),
            ),
            orders: OrderService::new(
                Arc::clone(&orchestrator),
                Arc::clone(&api),
                api_config.order_id.clone(),
            ),
            nfts: NftService::new(orchestrator, api),
            store,
            connectivity,
            low_memory,
            janitor,
            reactor,
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// Sender for the host's low-memory signal
    pub fn low_memory_signal(&self) -> broadcast::Sender<LowMemoryWarning> {
        self.low_memory.clone()
    }

    pub fn notify_low_memory(&self) {
        // The reactor is the only receiver and lives as long as self
        let _ = self.low_memory.send(LowMemoryWarning);
    }

    pub async fn shutdown(self) {
        if let Some(janitor) = self.janitor {
            janitor.shutdown().await;
        }
        self.reactor.abort();
        let _ = self.reactor.await;
        self.store.flush().await;
        info!("Catalog services stopped");
    }
}
