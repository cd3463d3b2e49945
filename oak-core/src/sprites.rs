//! Sprite lookup and download.

use crate::pokeapi::{LookupError, SpeciesApi};
use std::sync::Arc;
use thiserror::Error;

/// A downloaded sprite ready to attach to a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub identifier: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(identifier: impl Into<String>, bytes: Vec<u8>) -> Self {
        let identifier = identifier.into();
        Self {
            filename: format!("{identifier}.png"),
            identifier,
            bytes,
        }
    }
}

/// Which stage of fetching a sprite failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpriteError {
    #[error("sprite lookup failed: {0}")]
    Lookup(LookupError),

    #[error("sprite download failed: {0}")]
    Download(LookupError),
}

impl SpriteError {
    /// True when the identifier simply has no sprite.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SpriteError::Lookup(LookupError::NotFound))
    }
}

/// Resolves identifiers to sprite URLs and image bytes.
#[derive(Clone)]
pub struct SpriteFetcher {
    api: Arc<dyn SpeciesApi>,
}

impl SpriteFetcher {
    pub fn new(api: Arc<dyn SpeciesApi>) -> Self {
        Self { api }
    }

    /// URL of the default front sprite for `identifier`.
    pub async fn fetch_sprite_url(&self, identifier: &str) -> Result<String, LookupError> {
        self.api.sprite_url(identifier).await
    }

    /// Look up and download the sprite for `identifier`.
    pub async fn fetch_attachment(&self, identifier: &str) -> Result<Attachment, SpriteError> {
        let url = self
            .fetch_sprite_url(identifier)
            .await
            .map_err(SpriteError::Lookup)?;
        let bytes = self.api.download(&url).await.map_err(SpriteError::Download)?;
        Ok(Attachment::new(identifier, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSpeciesApi;

    #[test]
    fn test_attachment_filename() {
        let attachment = Attachment::new("pikachu", vec![1, 2, 3]);
        assert_eq!(attachment.filename, "pikachu.png");
    }

    #[tokio::test]
    async fn test_fetch_attachment() {
        let api = Arc::new(MockSpeciesApi::new().with_sprite("pikachu", b"png".to_vec()));
        let fetcher = SpriteFetcher::new(api);

        let attachment = fetcher.fetch_attachment("pikachu").await.unwrap();
        assert_eq!(attachment.identifier, "pikachu");
        assert_eq!(attachment.bytes, b"png");
    }

    #[tokio::test]
    async fn test_unknown_identifier_is_not_found() {
        let fetcher = SpriteFetcher::new(Arc::new(MockSpeciesApi::new()));

        let err = fetcher.fetch_attachment("digimon").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_download_failure_is_distinguished() {
        let api = Arc::new(MockSpeciesApi::new().with_broken_sprite("missingno"));
        let fetcher = SpriteFetcher::new(api);

        let err = fetcher.fetch_attachment("missingno").await.unwrap_err();
        assert!(matches!(err, SpriteError::Download(_)));
        assert!(!err.is_not_found());
    }
}
