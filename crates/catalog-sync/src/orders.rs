use catalog_client::{ApiError, CatalogApi, Order};
use freshness_cache::FetchOrchestrator;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;

/// The user's cart
pub struct OrderService {
    orchestrator: Arc<FetchOrchestrator>,
    api: Arc<dyn CatalogApi>,
    order_id: String,
}

impl OrderService {
    pub fn new(
        orchestrator: Arc<FetchOrchestrator>,
        api: Arc<dyn CatalogApi>,
        order_id: impl Into<String>,
    ) -> Self {
        Self {
            orchestrator,
            api,
            order_id: order_id.into(),
        }
    }

    pub fn cache_key(order_id: &str) -> String {
        format!("order_{order_id}")
    }

    pub fn order(&self, skip_cache: bool) -> BoxStream<'static, Result<Order, ApiError>> {
        let api = Arc::clone(&self.api);
        let id = self.order_id.clone();
        self.orchestrator
            .fetch(Self::cache_key(&id), skip_cache, move || async move {
                api.order(&id).await
            })
            .boxed()
    }
}
