//! Conversation engine - one user turn from question to illustrated answer.
//!
//! A turn asks the completion model for an answer in the context of the
//! user's history, shortens the answer if it would not fit in a chat
//! message, then scans it for species mentions and attaches their sprites.

use crate::cache::{Clock, SystemClock};
use crate::completion::{CompletionBackend, CompletionError};
use crate::config::EngineConfig;
use crate::history::{SessionStore, UserId};
use crate::mentions::{MentionMatcher, PhraseMatcher};
use crate::pokeapi::SpeciesApi;
use crate::resolver::NameResolver;
use crate::species::SpeciesCache;
use crate::sprites::{Attachment, SpriteError, SpriteFetcher};
use openrouter::Message;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Reply to a successful species list refresh.
pub const REFRESH_CONFIRMATION: &str = "Lista actualizada.";

/// Errors that abort a turn.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("completion failed: {0}")]
    Completion(#[from] CompletionError),
}

/// The outcome of one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    /// Text to send back to the user.
    pub text: String,

    /// Sprites found in the text, at most `max_attachments`.
    pub attachments: Vec<Attachment>,

    /// Whether `text` is a summary of a longer answer.
    pub summarized: bool,
}

impl TurnReply {
    fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
            summarized: false,
        }
    }
}

/// Result of a direct sprite request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpriteOutcome {
    Found {
        identifier: String,
        attachment: Attachment,
    },
    NotFound {
        identifier: String,
    },
    DownloadFailed {
        identifier: String,
    },
}

impl SpriteOutcome {
    /// Message shown alongside (or instead of) the sprite.
    pub fn message(&self, description: &str) -> String {
        match self {
            SpriteOutcome::Found { identifier, .. } => {
                format!("Sprite de **{description}** ({identifier}):")
            }
            SpriteOutcome::NotFound { .. } => {
                "No encontré información de ese Pokémon o forma.".to_string()
            }
            SpriteOutcome::DownloadFailed { .. } => "No se pudo descargar el sprite.".to_string(),
        }
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        match self {
            SpriteOutcome::Found { attachment, .. } => Some(attachment),
            _ => None,
        }
    }
}

/// What a completion step produced for a turn.
enum Answer {
    /// Model text, sent as is.
    Text(String),
    /// A summary (or truncation) of a reply that was too long.
    Shortened(String),
    /// The endpoint's status error, passed on verbatim as the reply.
    Upstream(String),
}

/// Orchestrates turns. Shared by every concurrent interaction.
pub struct ConversationEngine {
    config: EngineConfig,
    backend: Arc<dyn CompletionBackend>,
    species: Arc<SpeciesCache>,
    resolver: NameResolver,
    sprites: SpriteFetcher,
    matcher: Box<dyn MentionMatcher>,
    sessions: SessionStore,
}

impl ConversationEngine {
    /// Create an engine using the system clock.
    pub fn new(
        config: EngineConfig,
        backend: Arc<dyn CompletionBackend>,
        api: Arc<dyn SpeciesApi>,
        species: Arc<SpeciesCache>,
    ) -> Self {
        Self::with_clock(config, backend, api, species, Arc::new(SystemClock))
    }

    /// Create an engine whose history and memo expiry follow `clock`.
    pub fn with_clock(
        config: EngineConfig,
        backend: Arc<dyn CompletionBackend>,
        api: Arc<dyn SpeciesApi>,
        species: Arc<SpeciesCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let resolver = NameResolver::new(
            backend.clone(),
            config.resolver_model.clone(),
            config.memo_capacity,
            config.memo_ttl,
            clock.clone(),
        );
        let sessions = SessionStore::new(
            config.max_users,
            config.max_history_messages,
            config.history_idle_ttl,
            clock,
        );

        Self {
            config,
            backend,
            species,
            resolver,
            sprites: SpriteFetcher::new(api),
            matcher: Box::new(PhraseMatcher),
            sessions,
        }
    }

    /// Replace the mention matcher.
    pub fn with_matcher(mut self, matcher: impl MentionMatcher + 'static) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    /// Handle one user message.
    pub async fn turn(&self, user: UserId, prompt: &str) -> Result<TurnReply, TurnError> {
        if self.config.is_refresh_command(prompt) {
            return Ok(self.refresh_species().await);
        }

        let history = self.sessions.history(user).await;
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(&self.config.system_prompt));
        messages.extend(history);
        messages.push(Message::user(prompt));

        let answer = match self.backend.complete(&self.config.model, messages).await {
            Ok(text) => Answer::Text(text),
            Err(err) => {
                let text = err.as_reply().ok_or(err)?;
                warn!(user, reply = %text, "completion endpoint returned an error status");
                Answer::Upstream(text)
            }
        };

        let answer = match answer {
            Answer::Text(text) => self.fit_length(text).await,
            other => other,
        };

        let reply = match answer {
            Answer::Upstream(text) => TurnReply::text_only(text),
            Answer::Text(text) => self.illustrated(text, false).await,
            Answer::Shortened(text) => self.illustrated(text, true).await,
        };

        self.sessions.record_turn(user, prompt, &reply.text).await;

        info!(
            user,
            chars = reply.text.chars().count(),
            attachments = reply.attachments.len(),
            summarized = reply.summarized,
            "turn complete"
        );
        Ok(reply)
    }

    /// Resolve a description and fetch its sprite.
    pub async fn sprite(&self, description: &str) -> Result<SpriteOutcome, TurnError> {
        let identifier = self.resolver.resolve(description).await?;

        let outcome = match self.sprites.fetch_attachment(&identifier).await {
            Ok(attachment) => SpriteOutcome::Found {
                identifier,
                attachment,
            },
            Err(SpriteError::Download(e)) => {
                warn!(identifier = %identifier, error = %e, "sprite download failed");
                SpriteOutcome::DownloadFailed { identifier }
            }
            Err(SpriteError::Lookup(e)) => {
                debug!(identifier = %identifier, error = %e, "no sprite for identifier");
                SpriteOutcome::NotFound { identifier }
            }
        };
        Ok(outcome)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn species(&self) -> &SpeciesCache {
        &self.species
    }

    pub fn resolver(&self) -> &NameResolver {
        &self.resolver
    }

    async fn refresh_species(&self) -> TurnReply {
        match self.species.refresh().await {
            Ok(count) => {
                info!(count, "species list refreshed on request");
                TurnReply::text_only(REFRESH_CONFIRMATION)
            }
            Err(e) => {
                warn!(error = %e, "species list refresh failed");
                TurnReply::text_only(format!("No se pudo actualizar la lista: {e}"))
            }
        }
    }

    /// Summarize `text` if it is too long to send.
    async fn fit_length(&self, text: String) -> Answer {
        let threshold = self.config.summary_threshold;
        let length = text.chars().count();
        if length < threshold {
            return Answer::Text(text);
        }

        debug!(length, threshold, "summarizing long reply");
        let mut request = String::from(include_str!("prompts/summarize.txt").trim_end());
        request.push_str("\n\n");
        request.push_str(&text);
        let messages = vec![
            Message::system(include_str!("prompts/summarize_system.txt").trim()),
            Message::user(request),
        ];

        match self.backend.complete(&self.config.summary_model, messages).await {
            Ok(summary) => Answer::Shortened(summary),
            Err(err) => match err.as_reply() {
                Some(reply) => {
                    warn!(reply = %reply, "summary endpoint returned an error status");
                    Answer::Upstream(reply)
                }
                None => {
                    warn!(error = %err, "summary failed, truncating reply");
                    Answer::Shortened(text.chars().take(threshold).collect())
                }
            },
        }
    }

    async fn illustrated(&self, text: String, summarized: bool) -> TurnReply {
        let attachments = self.illustrate(&text).await;
        TurnReply {
            text,
            attachments,
            summarized,
        }
    }

    /// Find species mentioned in `text` and download up to
    /// `max_attachments` of their sprites.
    async fn illustrate(&self, text: &str) -> Vec<Attachment> {
        let identifiers = self.mentioned_species(text).await;

        let mut attachments = Vec::new();
        for identifier in identifiers {
            if attachments.len() >= self.config.max_attachments {
                break;
            }
            match self.sprites.fetch_attachment(&identifier).await {
                Ok(attachment) => attachments.push(attachment),
                Err(e) => debug!(identifier = %identifier, error = %e, "skipping sprite"),
            }
        }
        attachments
    }

    /// Known identifiers for the candidate phrases in `text`, deduplicated.
    async fn mentioned_species(&self, text: &str) -> Vec<String> {
        let candidates = self.matcher.candidates(text);

        let mut seen = HashSet::new();
        let mut identifiers = Vec::new();
        for phrase in candidates {
            let identifier = match self.resolver.resolve(&phrase).await {
                Ok(identifier) => identifier,
                Err(e) => {
                    debug!(phrase = %phrase, error = %e, "could not resolve phrase");
                    continue;
                }
            };
            if self.species.is_known(&identifier).await && seen.insert(identifier.clone()) {
                identifiers.push(identifier);
            }
        }
        identifiers
    }
}
