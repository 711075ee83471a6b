//! Catalog data services
//!
//! Each service pairs a cache key scheme with one catalog API call and hands
//! both to the shared [`FetchOrchestrator`](freshness_cache::FetchOrchestrator),
//! so every read yields the cached value first (when fresh) and then the
//! network result.

pub mod collections;
pub mod error;
pub mod nfts;
pub mod orders;
pub mod profile;
pub mod services;
pub mod sort;

#[cfg(test)]
mod testing;

pub use collections::CollectionsService;
pub use error::{Result, SyncError};
pub use nfts::NftService;
pub use orders::OrderService;
pub use profile::{ProfileService, PROFILE_KEY};
pub use services::CatalogServices;
pub use sort::SortOptionStore;
