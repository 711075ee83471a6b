//! Catalog sync - one stale-while-revalidate pass over the catalog
//!
//! Boots the cache and API client from the environment, reads the profile and
//! the first collections page through the cache, and logs every emission.

use catalog_client::{ApiConfig, ApiError};
use catalog_sync::{CatalogServices, Result};
use freshness_cache::CacheConfig;
use futures::{Stream, StreamExt};
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env().add_directive("catalog_sync=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting catalog sync...");

    let cache_config = CacheConfig::from_env();
    let api_config = ApiConfig::from_env();
    info!("API: {}", api_config.base_url);
    info!("Cache dir: {:?}", cache_config.cache_dir);
    info!("Cache TTL: {} seconds", cache_config.default_ttl.as_secs());

    let services = CatalogServices::build(&cache_config, &api_config).await?;

    log_emissions("profile", services.profile.profile(false)).await;
    log_emissions("collections", services.collections.collections(0, false)).await;

    let stats = services.store().stats();
    info!(
        hits = stats.hits,
        misses = stats.misses,
        writes_skipped = stats.writes_skipped,
        "Cache stats"
    );

    services.shutdown().await;
    Ok(())
}

async fn log_emissions<T, S>(source: &str, mut emissions: S)
where
    S: Stream<Item = std::result::Result<T, ApiError>> + Unpin,
{
    let mut position = 0;
    while let Some(emission) = emissions.next().await {
        position += 1;
        match emission {
            Ok(_) => info!(source, position, "Received"),
            Err(e) => warn!(source, position, error = %e, "Fetch failed"),
        }
    }
    if position == 0 {
        warn!(source, "No emissions");
    }
}
