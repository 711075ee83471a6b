//! Catalog API HTTP client

use crate::config::ApiConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{ApiError, Result};
use crate::types::{Collection, CollectionSort, Nft, Order, Profile};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Network operations the data services depend on
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// One page of the collections listing, sorted server-side
    async fn collections(&self, page: u32, sort: CollectionSort) -> Result<Vec<Collection>>;

    async fn profile(&self, id: &str) -> Result<Profile>;

    async fn order(&self, id: &str) -> Result<Order>;

    async fn nft(&self, id: &str) -> Result<Nft>;
}

/// `CatalogApi` over HTTP
pub struct HttpCatalogApi {
    http: reqwest::Client,
    base_url: String,
    connectivity: ConnectivityMonitor,
}

impl HttpCatalogApi {
    pub fn new(config: &ApiConfig, connectivity: ConnectivityMonitor) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            connectivity,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        if !self.connectivity.is_online() {
            debug!(path = %path, "Offline, skipping request");
            return Err(ApiError::Offline);
        }

        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Catalog request");
        let response = self.http.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "Catalog request failed");
            return Err(ApiError::Status(status.as_u16()));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl CatalogApi for HttpCatalogApi {
    async fn collections(&self, page: u32, sort: CollectionSort) -> Result<Vec<Collection>> {
        self.get_json(&format!(
            "/api/v1/collections?page={}&sort_by={}",
            page,
            urlencoding::encode(sort.as_str())
        ))
        .await
    }

    async fn profile(&self, id: &str) -> Result<Profile> {
        self.get_json(&format!("/api/v1/profile/{}", urlencoding::encode(id)))
            .await
    }

    async fn order(&self, id: &str) -> Result<Order> {
        self.get_json(&format!("/api/v1/orders/{}", urlencoding::encode(id)))
            .await
    }

    async fn nft(&self, id: &str) -> Result<Nft> {
        self.get_json(&format!("/api/v1/nft/{}", urlencoding::encode(id)))
            .await
    }
}
