//! Free-text description to species identifier resolution.
//!
//! Uses a cheap completion model with a few-shot prompt to turn phrases like
//! "Meowth de Alola" into catalog identifiers like `meowth-alola`. Results
//! are memoized by exact description.

use crate::cache::{BoundedCache, Clock};
use crate::completion::{CompletionBackend, CompletionError};
use openrouter::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Default number of memoized descriptions.
pub const DEFAULT_MEMO_CAPACITY: usize = 4096;

/// Default idle lifetime of a memoized description.
pub const DEFAULT_MEMO_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Maps descriptions to identifiers through the completion backend.
pub struct NameResolver {
    backend: Arc<dyn CompletionBackend>,
    model: String,
    memo: Mutex<BoundedCache<String, String>>,
}

impl NameResolver {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        model: impl Into<String>,
        capacity: usize,
        ttl: Option<Duration>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            memo: Mutex::new(BoundedCache::new(capacity, ttl, clock)),
        }
    }

    /// Resolve `description` to an identifier.
    ///
    /// The model's answer is lowercased and trimmed but otherwise accepted as
    /// is; a bad identifier just fails the later sprite lookup. Failed
    /// completions are not memoized.
    pub async fn resolve(&self, description: &str) -> Result<String, CompletionError> {
        if let Some(hit) = self.memo.lock().await.get(&description.to_string()) {
            return Ok(hit.clone());
        }

        let prompt = build_prompt(description);
        let answer = self
            .backend
            .complete(&self.model, vec![Message::user(prompt)])
            .await?;
        let identifier = answer.trim().to_lowercase();

        debug!(description, identifier = %identifier, "resolved description");
        self.memo
            .lock()
            .await
            .insert(description.to_string(), identifier.clone());
        Ok(identifier)
    }

    /// Number of memoized descriptions.
    pub async fn memo_len(&self) -> usize {
        self.memo.lock().await.len()
    }
}

fn build_prompt(description: &str) -> String {
    let mut prompt = String::from(include_str!("prompts/resolve_form.txt"));
    prompt.push_str(&format!(
        "Descripción: {description}\nResultado solo con el nombre correcto:"
    ));
    prompt
}
