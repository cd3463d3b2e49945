//! Testing utilities.
//!
//! This module provides deterministic stand-ins for the remote services:
//! - `MockCompletion` for scripted completion replies without API calls
//! - `MockSpeciesApi` for an in-memory species catalog and sprite store
//! - `ManualClock` for driving cache expiry by hand
//! - `TestHarness` for assembling a full engine over the mocks

use crate::cache::Clock;
use crate::completion::{CompletionBackend, CompletionError};
use crate::config::EngineConfig;
use crate::engine::{ConversationEngine, TurnError, TurnReply};
use crate::history::UserId;
use crate::pokeapi::{LookupError, SpeciesApi};
use crate::species::SpeciesCache;
use async_trait::async_trait;
use openrouter::Message;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move time forward by `by`.
    pub fn advance(&self, by: Duration) {
        if let Ok(mut offset) = self.offset.lock() {
            *offset += by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().map(|o| *o).unwrap_or_default();
        self.start + offset
    }
}

/// A completion request as seen by [`MockCompletion`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub messages: Vec<Message>,
}

impl RecordedCall {
    /// Content of the final message in the request.
    pub fn last_content(&self) -> &str {
        self.messages.last().map(|m| m.content.as_str()).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
enum Scripted {
    Reply(String),
    Status { status: u16, body: String },
    Transport(String),
}

impl Scripted {
    fn into_result(self) -> Result<String, CompletionError> {
        match self {
            Scripted::Reply(text) => Ok(text),
            Scripted::Status { status, body } => Err(CompletionError::Status { status, body }),
            Scripted::Transport(e) => Err(CompletionError::Transport(e)),
        }
    }
}

#[derive(Default)]
struct MockCompletionState {
    queue: VecDeque<Scripted>,
    calls: Vec<RecordedCall>,
}

/// A completion backend that returns scripted responses.
///
/// Each call is answered by, in order of precedence:
/// 1. the first rule whose needle occurs in the last message,
/// 2. the next queued response,
/// 3. the fallback reply (empty unless set).
#[derive(Default)]
pub struct MockCompletion {
    rules: Vec<(String, Scripted)>,
    fallback: String,
    state: Mutex<MockCompletionState>,
}

impl MockCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.push(Scripted::Reply(text.into()))
    }

    /// Queue a non-success status.
    pub fn with_status_error(self, status: u16, body: impl Into<String>) -> Self {
        self.push(Scripted::Status {
            status,
            body: body.into(),
        })
    }

    /// Queue a transport failure.
    pub fn with_transport_error(self, message: impl Into<String>) -> Self {
        self.push(Scripted::Transport(message.into()))
    }

    /// Answer `reply` whenever the last message contains `needle`.
    pub fn with_rule(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Scripted::Reply(reply.into())));
        self
    }

    /// Fail with `status` whenever the last message contains `needle`.
    pub fn with_status_rule(
        mut self,
        needle: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        self.rules.push((
            needle.into(),
            Scripted::Status {
                status,
                body: body.into(),
            },
        ));
        self
    }

    /// Reply used when no rule matches and the queue is empty.
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = text.into();
        self
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().map(|s| s.calls.len()).unwrap_or_default()
    }

    fn push(self, scripted: Scripted) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.queue.push_back(scripted);
        }
        self
    }
}

#[async_trait]
impl CompletionBackend for MockCompletion {
    async fn complete(
        &self,
        model: &str,
        messages: Vec<Message>,
    ) -> Result<String, CompletionError> {
        let call = RecordedCall {
            model: model.to_string(),
            messages,
        };

        let rule = self
            .rules
            .iter()
            .find(|(needle, _)| call.last_content().contains(needle.as_str()))
            .map(|(_, scripted)| scripted.clone());

        let mut state = self
            .state
            .lock()
            .map_err(|_| CompletionError::Transport("mock state poisoned".to_string()))?;
        state.calls.push(call);

        let scripted = rule
            .or_else(|| state.queue.pop_front())
            .unwrap_or_else(|| Scripted::Reply(self.fallback.clone()));
        scripted.into_result()
    }
}

#[derive(Debug, Clone)]
enum MockSprite {
    Available(Vec<u8>),
    BrokenDownload,
}

#[derive(Default)]
struct MockSpeciesState {
    listing_calls: usize,
    sprite_lookups: Vec<String>,
}

/// An in-memory species catalog.
#[derive(Default)]
pub struct MockSpeciesApi {
    species: Vec<String>,
    sprites: HashMap<String, MockSprite>,
    listing_fails: bool,
    state: Mutex<MockSpeciesState>,
}

impl MockSpeciesApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Species returned by the listing, in order.
    pub fn with_species<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.species.extend(names.into_iter().map(Into::into));
        self
    }

    /// A sprite that can be looked up and downloaded.
    pub fn with_sprite(mut self, identifier: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.sprites
            .insert(identifier.into(), MockSprite::Available(bytes));
        self
    }

    /// A sprite whose URL resolves but whose download fails.
    pub fn with_broken_sprite(mut self, identifier: impl Into<String>) -> Self {
        self.sprites
            .insert(identifier.into(), MockSprite::BrokenDownload);
        self
    }

    /// Make the listing call fail.
    pub fn failing_listing(mut self) -> Self {
        self.listing_fails = true;
        self
    }

    pub fn listing_calls(&self) -> usize {
        self.state.lock().map(|s| s.listing_calls).unwrap_or_default()
    }

    /// Identifiers passed to `sprite_url`, in call order.
    pub fn sprite_lookups(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.sprite_lookups.clone())
            .unwrap_or_default()
    }
}

const MOCK_SPRITE_HOST: &str = "mock://sprites/";

#[async_trait]
impl SpeciesApi for MockSpeciesApi {
    async fn list_species(&self) -> Result<Vec<String>, LookupError> {
        if let Ok(mut state) = self.state.lock() {
            state.listing_calls += 1;
        }
        if self.listing_fails {
            return Err(LookupError::Transport("catalog unreachable".to_string()));
        }
        Ok(self.species.clone())
    }

    async fn sprite_url(&self, identifier: &str) -> Result<String, LookupError> {
        if let Ok(mut state) = self.state.lock() {
            state.sprite_lookups.push(identifier.to_string());
        }
        if self.sprites.contains_key(identifier) {
            Ok(format!("{MOCK_SPRITE_HOST}{identifier}"))
        } else {
            Err(LookupError::NotFound)
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, LookupError> {
        let identifier = url
            .strip_prefix(MOCK_SPRITE_HOST)
            .ok_or_else(|| LookupError::Malformed(format!("unexpected url {url}")))?;
        match self.sprites.get(identifier) {
            Some(MockSprite::Available(bytes)) => Ok(bytes.clone()),
            Some(MockSprite::BrokenDownload) => Err(LookupError::Status(500)),
            None => Err(LookupError::NotFound),
        }
    }
}

static HARNESS_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Test harness for running turns against mocks.
pub struct TestHarness {
    pub engine: ConversationEngine,
    pub completion: Arc<MockCompletion>,
    pub species_api: Arc<MockSpeciesApi>,
    pub clock: Arc<ManualClock>,
    cache_path: PathBuf,
}

impl TestHarness {
    /// Build an engine whose name set starts as `known`.
    pub fn new(completion: MockCompletion, species_api: MockSpeciesApi, known: &[&str]) -> Self {
        Self::with_config(EngineConfig::new(), completion, species_api, known)
    }

    pub fn with_config(
        config: EngineConfig,
        completion: MockCompletion,
        species_api: MockSpeciesApi,
        known: &[&str],
    ) -> Self {
        let cache_path = std::env::temp_dir().join(format!(
            "oak-harness-{}-{}.json",
            std::process::id(),
            HARNESS_SEQ.fetch_add(1, Ordering::Relaxed)
        ));

        let completion = Arc::new(completion);
        let species_api = Arc::new(species_api);
        let clock = Arc::new(ManualClock::new());

        let species = Arc::new(SpeciesCache::preloaded(
            cache_path.clone(),
            species_api.clone(),
            known.iter().map(|n| n.to_string()),
        ));
        let engine = ConversationEngine::with_clock(
            config,
            completion.clone(),
            species_api.clone(),
            species,
            clock.clone(),
        );

        Self {
            engine,
            completion,
            species_api,
            clock,
            cache_path,
        }
    }

    /// Run a turn for `user`.
    pub async fn turn(&self, user: UserId, prompt: &str) -> Result<TurnReply, TurnError> {
        self.engine.turn(user, prompt).await
    }

    /// Completion calls that were chat turns (carry the system prompt).
    pub fn chat_calls(&self) -> Vec<RecordedCall> {
        let system = &self.engine.config().system_prompt;
        self.completion
            .calls()
            .into_iter()
            .filter(|c| c.messages.first().is_some_and(|m| &m.content == system))
            .collect()
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.cache_path);
    }
}
