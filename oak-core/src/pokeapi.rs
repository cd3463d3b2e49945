//! PokéAPI species-data client.
//!
//! Three calls are needed: the species listing (for the known-name set),
//! the per-identifier detail record (for its default front sprite), and a
//! plain download of the sprite image itself.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;

const API_BASE: &str = "https://pokeapi.co/api/v2";

/// Page size used for the species listing; large enough to return every entry.
pub const LISTING_LIMIT: usize = 10_000;

/// Errors from species-data lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("not found")]
    NotFound,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Remote species catalog and sprite source.
#[async_trait]
pub trait SpeciesApi: Send + Sync {
    /// Every species/form identifier in the catalog.
    async fn list_species(&self) -> Result<Vec<String>, LookupError>;

    /// URL of the default front-facing sprite for `identifier`.
    async fn sprite_url(&self, identifier: &str) -> Result<String, LookupError>;

    /// Raw bytes behind `url`.
    async fn download(&self, url: &str) -> Result<Vec<u8>, LookupError>;
}

/// HTTP client for pokeapi.co (or a compatible mirror).
#[derive(Clone)]
pub struct PokeApi {
    client: reqwest::Client,
    base_url: String,
}

impl PokeApi {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: API_BASE.to_string(),
        }
    }

    /// Use a different base URL, e.g. a local mirror.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// `{base}/pokemon/{identifier}`, with the identifier encoded as a single
    /// path segment.
    fn detail_url(&self, identifier: &str) -> Result<Url, LookupError> {
        let identifier = identifier.trim().to_lowercase();
        if matches!(identifier.as_str(), "" | "." | "..") {
            return Err(LookupError::NotFound);
        }

        let mut url = Url::parse(&format!("{}/pokemon", self.base_url))
            .map_err(|e| LookupError::Malformed(format!("bad base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| LookupError::Malformed("base url cannot hold a path".to_string()))?
            .push(&identifier);
        Ok(url)
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, LookupError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LookupError::Transport(e.to_string()))?;

        match response.status() {
            s if s.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(LookupError::NotFound),
            s => Err(LookupError::Status(s.as_u16())),
        }
    }
}

impl Default for PokeApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeciesApi for PokeApi {
    async fn list_species(&self) -> Result<Vec<String>, LookupError> {
        let url = format!("{}/pokemon?limit={LISTING_LIMIT}", self.base_url);
        let listing: SpeciesListing = self
            .get(&url)
            .await?
            .json()
            .await
            .map_err(|e| LookupError::Malformed(e.to_string()))?;

        Ok(listing.into_names())
    }

    async fn sprite_url(&self, identifier: &str) -> Result<String, LookupError> {
        let url = self.detail_url(identifier)?;
        let detail: SpeciesDetail = self
            .get(url.as_str())
            .await?
            .json()
            .await
            .map_err(|e| LookupError::Malformed(e.to_string()))?;

        detail.front_default()
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, LookupError> {
        let bytes = self
            .get(url)
            .await?
            .bytes()
            .await
            .map_err(|e| LookupError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct SpeciesListing {
    results: Vec<NamedResource>,
}

impl SpeciesListing {
    fn into_names(self) -> Vec<String> {
        self.results.into_iter().map(|r| r.name).collect()
    }
}

#[derive(Debug, Deserialize)]
struct NamedResource {
    name: String,
    #[allow(dead_code)]
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpeciesDetail {
    sprites: Sprites,
}

impl SpeciesDetail {
    fn front_default(self) -> Result<String, LookupError> {
        self.sprites.front_default.ok_or(LookupError::NotFound)
    }
}

#[derive(Debug, Deserialize)]
struct Sprites {
    #[serde(default)]
    front_default: Option<String>,
}
