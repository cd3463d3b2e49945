//! Species name cache.
//!
//! The set of known identifiers lives in a flat JSON array on disk and is
//! filled from the remote catalog when the file is missing or unreadable.

use crate::pokeapi::{LookupError, SpeciesApi};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Default location of the name cache file.
pub const DEFAULT_CACHE_FILE: &str = "pokemon_list.json";

/// Errors from refreshing the name set.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog fetch failed: {0}")]
    Fetch(#[from] LookupError),

    #[error("cache file encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Known species identifiers, shared by every concurrent turn.
pub struct SpeciesCache {
    path: PathBuf,
    api: Arc<dyn SpeciesApi>,
    names: RwLock<HashSet<String>>,
}

impl SpeciesCache {
    /// Build a cache over `path` with an empty name set. Call [`load`](Self::load)
    /// before use.
    pub fn new(path: impl Into<PathBuf>, api: Arc<dyn SpeciesApi>) -> Self {
        Self {
            path: path.into(),
            api,
            names: RwLock::new(HashSet::new()),
        }
    }

    /// Build a cache with a name set already in hand. The file at `path` is
    /// only written by a later [`refresh`](Self::refresh).
    pub fn preloaded(
        path: impl Into<PathBuf>,
        api: Arc<dyn SpeciesApi>,
        names: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            path: path.into(),
            api,
            names: RwLock::new(names.into_iter().collect()),
        }
    }

    /// Build and populate a cache in one step.
    pub async fn open(path: impl Into<PathBuf>, api: Arc<dyn SpeciesApi>) -> Self {
        let cache = Self::new(path, api);
        cache.load().await;
        cache
    }

    /// Populate from the cache file, falling back to the remote catalog.
    ///
    /// Never fails: if neither source works the set is left empty and no
    /// mention will ever resolve as a known name.
    pub async fn load(&self) -> usize {
        let names = match read_cache_file(&self.path).await {
            Some(names) => {
                debug!(path = %self.path.display(), count = names.len(), "loaded species cache file");
                names
            }
            None => match self.fetch_and_persist().await {
                Ok(names) => names,
                Err(e) => {
                    warn!(error = %e, "species catalog unavailable, continuing with empty name set");
                    Vec::new()
                }
            },
        };

        self.replace(names).await
    }

    /// Force a remote fetch, rewrite the cache file and swap in the new set.
    ///
    /// On failure the current set is kept.
    pub async fn refresh(&self) -> Result<usize, CatalogError> {
        let names = self.fetch_and_persist().await?;
        Ok(self.replace(names).await)
    }

    /// Whether `identifier` should be treated as a real species or form.
    ///
    /// Exact members of the set count, as does anything containing a hyphen:
    /// regional, mega and other alternate forms are not all in the listing.
    pub async fn is_known(&self, identifier: &str) -> bool {
        let names = self.names.read().await;
        is_known_in(&*names, identifier)
    }

    pub async fn len(&self) -> usize {
        self.names.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.names.read().await.is_empty()
    }

    async fn fetch_and_persist(&self) -> Result<Vec<String>, CatalogError> {
        let names = self.api.list_species().await?;
        info!(count = names.len(), "fetched species catalog");

        let content = serde_json::to_string(&names)?;
        if let Err(e) = fs::write(&self.path, content).await {
            // The fetched list is still usable for this process.
            warn!(path = %self.path.display(), error = %e, "could not write species cache file");
        }
        Ok(names)
    }

    async fn replace(&self, names: Vec<String>) -> usize {
        let set: HashSet<String> = names.into_iter().collect();
        let count = set.len();
        *self.names.write().await = set;
        count
    }
}

/// Membership test used by [`SpeciesCache::is_known`].
pub fn is_known_in(names: &HashSet<String>, identifier: &str) -> bool {
    names.contains(identifier) || identifier.contains('-')
}

async fn read_cache_file(path: &Path) -> Option<Vec<String>> {
    let content = fs::read_to_string(path).await.ok()?;
    match serde_json::from_str(&content) {
        Ok(names) => Some(names),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable species cache file");
            None
        }
    }
}
