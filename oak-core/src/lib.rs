//! Professor Oak - Pokémon question answering with sprite illustrations.
//!
//! This crate provides:
//! - A conversation engine that answers through a chat-completion model
//! - Species mention detection and sprite attachment via PokéAPI
//! - Bounded per-user conversation history
//! - A cached list of known species identifiers
//!
//! # Quick Start
//!
//! ```ignore
//! use oak_core::{ConversationEngine, EngineConfig, PokeApi, SpeciesCache};
//! use openrouter::OpenRouter;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = Arc::new(OpenRouter::from_env()?);
//!     let api = Arc::new(PokeApi::new());
//!     let species = Arc::new(SpeciesCache::open("pokemon_list.json", api.clone()).await);
//!
//!     let engine = ConversationEngine::new(EngineConfig::new(), backend, api, species);
//!
//!     let reply = engine.turn(42, "Dime sobre Pikachu").await?;
//!     println!("{} ({} sprites)", reply.text, reply.attachments.len());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod completion;
pub mod config;
pub mod engine;
pub mod history;
pub mod mentions;
pub mod pokeapi;
pub mod resolver;
pub mod species;
pub mod sprites;
pub mod testing;

// Primary public API
pub use cache::{BoundedCache, Clock, SystemClock};
pub use completion::{CompletionBackend, CompletionError};
pub use config::{BotConfig, ConfigError, EngineConfig};
pub use engine::{ConversationEngine, SpriteOutcome, TurnError, TurnReply};
pub use history::{SessionStore, UserId};
pub use mentions::{MentionMatcher, PhraseMatcher};
pub use pokeapi::{LookupError, PokeApi, SpeciesApi};
pub use resolver::NameResolver;
pub use species::{CatalogError, SpeciesCache};
pub use sprites::{Attachment, SpriteError, SpriteFetcher};
pub use testing::{ManualClock, MockCompletion, MockSpeciesApi, TestHarness};
