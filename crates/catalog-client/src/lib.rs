//! Catalog marketplace API client
//!
//! The [`CatalogApi`] trait is the network seam used by the data services;
//! [`HttpCatalogApi`] implements it with reqwest and refuses to send anything
//! while the [`ConnectivityMonitor`] reports the device offline.

mod client;
mod config;
mod connectivity;
mod error;
mod types;

pub use client::{CatalogApi, HttpCatalogApi};
pub use config::ApiConfig;
pub use connectivity::ConnectivityMonitor;
pub use error::{ApiError, Result};
pub use types::{Collection, CollectionSort, Nft, Order, Profile};
