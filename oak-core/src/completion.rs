//! Chat-completion seam.
//!
//! The engine and the name resolver talk to the language model through
//! [`CompletionBackend`], so tests can script replies without a network.

use async_trait::async_trait;
use openrouter::{Message, OpenRouter, Request};
use thiserror::Error;

/// Errors from a completion call.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The endpoint answered with a non-success status.
    #[error("Error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Completion transport failed: {0}")]
    Transport(String),

    #[error("Malformed completion response: {0}")]
    Malformed(String),
}

impl CompletionError {
    /// The text shown to the user when a chat turn's completion fails with a
    /// status error: the status code and raw body, verbatim.
    pub fn as_reply(&self) -> Option<String> {
        match self {
            CompletionError::Status { .. } => Some(self.to_string()),
            _ => None,
        }
    }
}

impl From<openrouter::Error> for CompletionError {
    fn from(err: openrouter::Error) -> Self {
        match err {
            openrouter::Error::Api { status, body } => CompletionError::Status { status, body },
            openrouter::Error::Network(e) => CompletionError::Transport(e),
            openrouter::Error::Parse(e) => CompletionError::Malformed(e),
            openrouter::Error::EmptyChoices => {
                CompletionError::Malformed("no choices returned".to_string())
            }
            other @ (openrouter::Error::NoApiKey | openrouter::Error::Config(_)) => {
                CompletionError::Transport(other.to_string())
            }
        }
    }
}

/// A chat-completion provider.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send `messages` to `model` and return the trimmed text of the first choice.
    async fn complete(
        &self,
        model: &str,
        messages: Vec<Message>,
    ) -> Result<String, CompletionError>;
}

#[async_trait]
impl CompletionBackend for OpenRouter {
    async fn complete(
        &self,
        model: &str,
        messages: Vec<Message>,
    ) -> Result<String, CompletionError> {
        let request = Request::new(messages).with_model(model);
        let response = OpenRouter::complete(self, request).await?;
        Ok(response.text().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_reply_embeds_code_and_body() {
        let err = CompletionError::from(openrouter::Error::Api {
            status: 429,
            body: "rate limited".to_string(),
        });
        let reply = err.as_reply().unwrap();
        assert!(reply.contains("429"));
        assert!(reply.contains("rate limited"));
    }

    #[test]
    fn test_transport_error_has_no_reply() {
        let err = CompletionError::from(openrouter::Error::Network("refused".to_string()));
        assert!(err.as_reply().is_none());
        assert!(matches!(err, CompletionError::Transport(_)));
    }

    #[test]
    fn test_empty_choices_is_malformed() {
        let err = CompletionError::from(openrouter::Error::EmptyChoices);
        assert!(matches!(err, CompletionError::Malformed(_)));
    }
}
