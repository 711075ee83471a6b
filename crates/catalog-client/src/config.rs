use std::env;
use std::time::Duration;

/// Catalog API configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Profile fetched by the profile service
    pub profile_id: String,
    /// Order (cart) fetched by the order service
    pub order_id: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout: Duration::from_secs(30),
            profile_id: "1".to_string(),
            order_id: "1".to_string(),
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let timeout = env::var("CATALOG_API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        Self {
            base_url: env::var("CATALOG_API_URL").unwrap_or(defaults.base_url),
            timeout,
            profile_id: env::var("CATALOG_PROFILE_ID").unwrap_or(defaults.profile_id),
            order_id: env::var("CATALOG_ORDER_ID").unwrap_or(defaults.order_id),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}
