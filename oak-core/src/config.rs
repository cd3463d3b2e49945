//! Engine and process configuration.

use crate::history::{DEFAULT_IDLE_TTL, DEFAULT_MAX_MESSAGES, DEFAULT_MAX_USERS};
use crate::resolver::{DEFAULT_MEMO_CAPACITY, DEFAULT_MEMO_TTL};
use crate::species::DEFAULT_CACHE_FILE;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Model used for answers, summaries and name resolution.
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash-lite";

/// Replies at or above this many characters are summarized.
pub const SUMMARY_THRESHOLD: usize = 1900;

/// Most sprites attached to a single reply.
pub const MAX_ATTACHMENTS: usize = 10;

/// Commands that reload the species list instead of asking the model.
pub const REFRESH_COMMANDS: &[&str] = &["update pokemon list", "actualizar lista pokemon"];

/// Errors loading process configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Tunables for the conversation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Model for chat answers.
    pub model: String,

    /// Model for summaries.
    pub summary_model: String,

    /// Model for description-to-identifier resolution.
    pub resolver_model: String,

    /// System prompt placed before every conversation.
    pub system_prompt: String,

    pub summary_threshold: usize,

    pub max_attachments: usize,

    /// Case-insensitive inputs that trigger a species list refresh.
    pub refresh_commands: Vec<String>,

    pub max_history_messages: usize,
    pub max_users: usize,
    pub history_idle_ttl: Option<Duration>,

    pub memo_capacity: usize,
    pub memo_ttl: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            summary_model: DEFAULT_MODEL.to_string(),
            resolver_model: DEFAULT_MODEL.to_string(),
            system_prompt: include_str!("prompts/system.txt").trim().to_string(),
            summary_threshold: SUMMARY_THRESHOLD,
            max_attachments: MAX_ATTACHMENTS,
            refresh_commands: REFRESH_COMMANDS.iter().map(|c| c.to_string()).collect(),
            max_history_messages: DEFAULT_MAX_MESSAGES,
            max_users: DEFAULT_MAX_USERS,
            history_idle_ttl: Some(DEFAULT_IDLE_TTL),
            memo_capacity: DEFAULT_MEMO_CAPACITY,
            memo_ttl: Some(DEFAULT_MEMO_TTL),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use one model for answers, summaries and resolution.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.summary_model = model.clone();
        self.resolver_model = model.clone();
        self.model = model;
        self
    }

    pub fn with_resolver_model(mut self, model: impl Into<String>) -> Self {
        self.resolver_model = model.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_summary_threshold(mut self, threshold: usize) -> Self {
        self.summary_threshold = threshold;
        self
    }

    pub fn with_max_attachments(mut self, max: usize) -> Self {
        self.max_attachments = max;
        self
    }

    pub fn with_history_limits(
        mut self,
        max_users: usize,
        max_messages: usize,
        idle_ttl: Option<Duration>,
    ) -> Self {
        self.max_users = max_users;
        self.max_history_messages = max_messages;
        self.history_idle_ttl = idle_ttl;
        self
    }

    pub fn with_memo_limits(mut self, capacity: usize, ttl: Option<Duration>) -> Self {
        self.memo_capacity = capacity;
        self.memo_ttl = ttl;
        self
    }

    /// Whether `input` is one of the refresh commands.
    pub fn is_refresh_command(&self, input: &str) -> bool {
        let input = input.trim().to_lowercase();
        self.refresh_commands
            .iter()
            .any(|c| c.to_lowercase() == input)
    }
}

/// Settings read from the process environment.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Completion API credential (`API_KEY`).
    pub api_key: String,

    /// Chat platform credential (`DISCORD_TOKEN`).
    pub discord_token: String,

    /// `OAK_MODEL`, defaults to [`DEFAULT_MODEL`].
    pub model: String,

    /// `OAK_SPECIES_CACHE`, defaults to `pokemon_list.json`.
    pub species_cache: PathBuf,

    /// `OAK_HEALTH_ADDR`, defaults to `0.0.0.0:8080`.
    pub health_addr: String,

    /// `OPENROUTER_BASE_URL`, optional override.
    pub openrouter_base_url: Option<String>,

    /// `POKEAPI_BASE_URL`, optional override.
    pub pokeapi_base_url: Option<String>,
}

impl BotConfig {
    /// Read configuration from the environment. Missing credentials are the
    /// only fatal case.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let api_key = required("API_KEY")?;
        let discord_token = required("DISCORD_TOKEN")?;

        let health_addr = lookup("OAK_HEALTH_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());
        if health_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Invalid {
                name: "OAK_HEALTH_ADDR",
                reason: format!("'{health_addr}' is not a socket address"),
            });
        }

        Ok(Self {
            api_key,
            discord_token,
            model: lookup("OAK_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            species_cache: lookup("OAK_SPECIES_CACHE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_FILE)),
            health_addr,
            openrouter_base_url: lookup("OPENROUTER_BASE_URL"),
            pokeapi_base_url: lookup("POKEAPI_BASE_URL"),
        })
    }

    /// Engine settings derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new().with_model(&self.model)
    }
}
