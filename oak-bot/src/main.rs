//! Profesor Oak Discord bot.
//!
//! Answers `/oak` questions about the Pokémon world and posts sprites for
//! `/sprite` requests. A small HTTP endpoint reports liveness.
//!
//! ```bash
//! API_KEY=... DISCORD_TOKEN=... cargo run -p oak-bot
//! ```

mod handler;
mod health;

use handler::Handler;
use oak_core::{BotConfig, ConversationEngine, PokeApi, SpeciesCache};
use openrouter::OpenRouter;
use serenity::all::{Client, GatewayIntents};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = BotConfig::from_env()?;
    info!(model = %config.model, cache = %config.species_cache.display(), "starting");

    let mut backend = OpenRouter::new(&config.api_key);
    if let Some(url) = &config.openrouter_base_url {
        backend = backend.with_base_url(url);
    }
    let api = match &config.pokeapi_base_url {
        Some(url) => PokeApi::new().with_base_url(url),
        None => PokeApi::new(),
    };
    let api = Arc::new(api);

    let species = Arc::new(SpeciesCache::open(config.species_cache.clone(), api.clone()).await);
    info!(count = species.len().await, "species list ready");

    let engine = Arc::new(ConversationEngine::new(
        config.engine_config(),
        Arc::new(backend),
        api,
        species,
    ));

    let health_addr: SocketAddr = config.health_addr.parse()?;
    tokio::spawn(async move {
        if let Err(e) = health::serve(health_addr).await {
            error!(error = %e, "health endpoint stopped");
        }
    });

    let mut client = Client::builder(&config.discord_token, GatewayIntents::empty())
        .event_handler(Handler::new(engine))
        .await?;
    client.start().await?;

    Ok(())
}
