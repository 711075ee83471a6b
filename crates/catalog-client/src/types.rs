//! Data types for catalog API responses
//!
//! Field names follow the API's camelCase JSON. The same types are stored in
//! the local cache, so they serialize as well as deserialize.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An NFT collection as listed in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub nft_ids: Vec<String>,
}

impl Collection {
    pub fn nft_count(&self) -> usize {
        self.nft_ids.len()
    }
}

/// The signed-in user's profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    /// NFTs the user owns
    #[serde(default)]
    pub nft_ids: Vec<String>,
    /// NFTs the user has liked
    #[serde(default)]
    pub likes: Vec<String>,
}

/// The user's shopping cart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    #[serde(default)]
    pub nft_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nft {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub images: Vec<String>,
    /// 0 to 5 stars
    #[serde(default)]
    pub rating: u8,
    pub price: f64,
    #[serde(default)]
    pub author: Option<String>,
}

/// Server-side sort order for the collections listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CollectionSort {
    #[default]
    Name,
    NftCount,
}

impl CollectionSort {
    /// Value sent as `sort_by` and used in cache keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::NftCount => "nfts",
        }
    }
}

impl fmt::Display for CollectionSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(Self::Name),
            "nfts" => Ok(Self::NftCount),
            other => Err(format!("unknown collection sort: {other}")),
        }
    }
}
