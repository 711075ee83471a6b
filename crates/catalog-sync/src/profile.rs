use catalog_client::{ApiError, CatalogApi, Profile};
use freshness_cache::FetchOrchestrator;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;

pub const PROFILE_KEY: &str = "profile";

/// The signed-in user's profile
pub struct ProfileService {
    orchestrator: Arc<FetchOrchestrator>,
    api: Arc<dyn CatalogApi>,
    profile_id: String,
}

impl ProfileService {
    pub fn new(
        orchestrator: Arc<FetchOrchestrator>,
        api: Arc<dyn CatalogApi>,
        profile_id: impl Into<String>,
    ) -> Self {
        Self {
            orchestrator,
            api,
            profile_id: profile_id.into(),
        }
    }

    pub fn profile(&self, skip_cache: bool) -> BoxStream<'static, Result<Profile, ApiError>> {
        let api = Arc::clone(&self.api);
        let id = self.profile_id.clone();
        self.orchestrator
            .fetch(PROFILE_KEY, skip_cache, move || async move {
                api.profile(&id).await
            })
            .boxed()
    }

    /// Forget the cached profile, e.g. on sign-out
    pub async fn clear(&self) {
        self.orchestrator.store().clear(PROFILE_KEY).await;
    }
}
