use catalog_client::{ApiError, CatalogApi, Nft};
use freshness_cache::{fan_in, FetchOrchestrator};
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;

/// NFTs of one collection, cached as a whole per collection.
///
/// The network step requests every distinct NFT individually and only
/// completes once all of them have answered.
pub struct NftService {
    orchestrator: Arc<FetchOrchestrator>,
    api: Arc<dyn CatalogApi>,
}

impl NftService {
    pub fn new(orchestrator: Arc<FetchOrchestrator>, api: Arc<dyn CatalogApi>) -> Self {
        Self { orchestrator, api }
    }

    pub fn cache_key(collection_id: &str) -> String {
        format!("collection_id_{collection_id}")
    }

    pub fn collection_nfts(
        &self,
        collection_id: &str,
        nft_ids: Vec<String>,
        skip_cache: bool,
    ) -> BoxStream<'static, Result<Vec<Nft>, ApiError>> {
        let api = Arc::clone(&self.api);
        self.orchestrator
            .fetch(
                Self::cache_key(collection_id),
                skip_cache,
                move || async move {
                    fan_in(nft_ids, |id| {
                        let api = Arc::clone(&api);
                        async move { api.nft(&id).await }
                    })
                    .await
                },
            )
            .boxed()
    }
}
