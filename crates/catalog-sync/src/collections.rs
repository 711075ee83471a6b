use crate::sort::SortOptionStore;
use catalog_client::{ApiError, CatalogApi, Collection, CollectionSort};
use freshness_cache::FetchOrchestrator;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;

/// Paged collections listing, cached per page and sort order
pub struct CollectionsService {
    orchestrator: Arc<FetchOrchestrator>,
    api: Arc<dyn CatalogApi>,
    sort: Arc<SortOptionStore>,
}

impl CollectionsService {
    pub fn new(
        orchestrator: Arc<FetchOrchestrator>,
        api: Arc<dyn CatalogApi>,
        sort: Arc<SortOptionStore>,
    ) -> Self {
        Self {
            orchestrator,
            api,
            sort,
        }
    }

    pub fn cache_key(page: u32, sort: CollectionSort) -> String {
        format!("collections_page_{page}_sortedBy_{sort}")
    }

    /// One page in the currently selected sort order
    pub fn collections(
        &self,
        page: u32,
        skip_cache: bool,
    ) -> BoxStream<'static, Result<Vec<Collection>, ApiError>> {
        let sort = self.sort.get();
        let api = Arc::clone(&self.api);
        self.orchestrator
            .fetch(Self::cache_key(page, sort), skip_cache, move || async move {
                api.collections(page, sort).await
            })
            .boxed()
    }

    pub fn sort_options(&self) -> &Arc<SortOptionStore> {
        &self.sort
    }
}
