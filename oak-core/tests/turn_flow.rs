//! End-to-end turn tests over mocked completion and species services.
//!
//! Run with: `cargo test -p oak-core --test turn_flow`

use oak_core::engine::REFRESH_CONFIRMATION;
use oak_core::{
    ConversationEngine, EngineConfig, MentionMatcher, MockCompletion, MockSpeciesApi,
    SpeciesCache, SpriteOutcome, TestHarness, TurnError,
};
use openrouter::{Message, Role};
use std::sync::Arc;

const USER: u64 = 1001;

/// Needle matching the resolver prompt for exactly `phrase`.
fn resolving(phrase: &str) -> String {
    format!("Descripción: {phrase}\n")
}

/// Needle present in every resolver prompt. A rule on it keeps resolver
/// calls from consuming queued chat replies.
const ANY_RESOLUTION: &str = "Resultado solo con el nombre correcto";

/// Count of resolver calls whose prompt contains `needle`.
fn resolver_calls_containing(harness: &TestHarness, needle: &str) -> usize {
    harness
        .completion
        .calls()
        .iter()
        .filter(|c| c.last_content().contains(ANY_RESOLUTION) && c.last_content().contains(needle))
        .count()
}

// =============================================================================
// BASIC ANSWERS
// =============================================================================

#[tokio::test]
async fn test_answer_with_single_sprite() {
    let completion = MockCompletion::new()
        .with_reply("Pikachu es un Pokémon eléctrico.")
        .with_rule(resolving("pikachu es"), "pikachu");
    let api = MockSpeciesApi::new().with_sprite("pikachu", b"\x89PNG".to_vec());
    let harness = TestHarness::new(completion, api, &["pikachu", "raichu"]);

    let reply = harness.turn(USER, "Dime sobre Pikachu").await.unwrap();

    assert_eq!(reply.text, "Pikachu es un Pokémon eléctrico.");
    assert!(!reply.summarized);
    assert_eq!(reply.attachments.len(), 1);
    assert_eq!(reply.attachments[0].identifier, "pikachu");
    assert_eq!(reply.attachments[0].filename, "pikachu.png");
    assert_eq!(reply.attachments[0].bytes, b"\x89PNG");

    let chat = harness.chat_calls();
    assert_eq!(chat.len(), 1);
    assert_eq!(chat[0].messages.len(), 2);
    assert_eq!(chat[0].messages[0].role, Role::System);
    assert_eq!(chat[0].messages[1], Message::user("Dime sobre Pikachu"));
}

#[tokio::test]
async fn test_history_is_replayed_on_next_turn() {
    let completion = MockCompletion::new()
        .with_reply("Soy el Profesor Oak.")
        .with_reply("Bulbasaur es de tipo planta.")
        .with_rule(ANY_RESOLUTION, "");
    let harness = TestHarness::new(completion, MockSpeciesApi::new(), &[]);

    harness.turn(USER, "¿Quién eres?").await.unwrap();
    harness.turn(USER, "¿Y Bulbasaur?").await.unwrap();

    let chat = harness.chat_calls();
    assert_eq!(chat.len(), 2);

    let second = &chat[1].messages;
    assert_eq!(second.len(), 4);
    assert_eq!(second[1], Message::user("¿Quién eres?"));
    assert_eq!(second[2], Message::assistant("Soy el Profesor Oak."));
    assert_eq!(second[3], Message::user("¿Y Bulbasaur?"));

    let history = harness.engine.sessions().history(USER).await;
    assert_eq!(history.len(), 4);
    assert_eq!(history[3], Message::assistant("Bulbasaur es de tipo planta."));
}

#[tokio::test]
async fn test_other_users_history_not_shared() {
    let completion = MockCompletion::new()
        .with_reply("uno")
        .with_reply("dos")
        .with_rule(ANY_RESOLUTION, "");
    let harness = TestHarness::new(completion, MockSpeciesApi::new(), &[]);

    harness.turn(1, "hola").await.unwrap();
    let reply = harness.turn(2, "hola").await.unwrap();

    assert_eq!(reply.text, "dos");
    let chat = harness.chat_calls();
    assert_eq!(chat[1].messages.len(), 2);
}

#[tokio::test]
async fn test_history_limit_from_config() {
    let config = EngineConfig::new().with_history_limits(8, 2, None);
    let completion = MockCompletion::new()
        .with_reply("primera")
        .with_reply("segunda")
        .with_rule(ANY_RESOLUTION, "");
    let harness = TestHarness::with_config(config, completion, MockSpeciesApi::new(), &[]);

    harness.turn(USER, "uno").await.unwrap();
    harness.turn(USER, "dos").await.unwrap();

    let history = harness.engine.sessions().history(USER).await;
    assert_eq!(
        history,
        vec![Message::user("dos"), Message::assistant("segunda")]
    );
}

#[tokio::test]
async fn test_custom_system_prompt_and_models() {
    let config = EngineConfig::new()
        .with_model("chat/model")
        .with_resolver_model("resolver/model")
        .with_system_prompt("Eres un Pokédex.");
    let completion = MockCompletion::new()
        .with_reply("Mew.")
        .with_rule(resolving("mew"), "mew");
    let api = MockSpeciesApi::new().with_sprite("mew", vec![151]);
    let harness = TestHarness::with_config(config, completion, api, &["mew"]);

    harness.turn(USER, "?").await.unwrap();

    let calls = harness.completion.calls();
    assert_eq!(calls[0].model, "chat/model");
    assert_eq!(calls[0].messages[0], Message::system("Eres un Pokédex."));
    assert_eq!(calls[1].model, "resolver/model");
    assert_eq!(harness.chat_calls().len(), 1);
}

// =============================================================================
// LENGTH LIMIT
// =============================================================================

#[tokio::test]
async fn test_short_reply_never_summarized() {
    let long_but_fits = "x".repeat(1899);
    let completion = MockCompletion::new()
        .with_reply(long_but_fits.clone())
        .with_rule("Resume este texto", "should not be used");
    let harness = TestHarness::new(completion, MockSpeciesApi::new(), &[]);

    let reply = harness.turn(USER, "Cuéntame todo").await.unwrap();

    assert_eq!(reply.text, long_but_fits);
    assert!(!reply.summarized);
    assert!(!harness
        .completion
        .calls()
        .iter()
        .any(|c| c.last_content().contains("Resume este texto")));
}

#[tokio::test]
async fn test_reply_at_threshold_is_summarized() {
    let too_long = "x".repeat(1900);
    let completion = MockCompletion::new()
        .with_reply(too_long.clone())
        .with_rule("Resume este texto", "Resumen corto.");
    let harness = TestHarness::new(completion, MockSpeciesApi::new(), &[]);

    let reply = harness.turn(USER, "Cuéntame todo").await.unwrap();

    assert_eq!(reply.text, "Resumen corto.");
    assert!(reply.summarized);

    let summary_call = harness
        .completion
        .calls()
        .into_iter()
        .find(|c| c.last_content().contains("Resume este texto"))
        .unwrap();
    assert!(summary_call.last_content().ends_with(&too_long));
    assert_eq!(summary_call.messages[0].role, Role::System);

    let history = harness.engine.sessions().history(USER).await;
    assert_eq!(history[1], Message::assistant("Resumen corto."));
}

#[tokio::test]
async fn test_mentions_scanned_in_summary_not_original() {
    let original = "x".repeat(2000);
    let completion = MockCompletion::new()
        .with_reply(original)
        .with_rule("Resume este texto", "Pikachu.")
        .with_rule(resolving("pikachu"), "pikachu")
        .with_rule(ANY_RESOLUTION, "");
    let api = MockSpeciesApi::new().with_sprite("pikachu", vec![25]);
    let harness = TestHarness::new(completion, api, &["pikachu"]);

    let reply = harness.turn(USER, "Cuéntame todo").await.unwrap();

    assert_eq!(reply.text, "Pikachu.");
    assert!(reply.summarized);
    assert_eq!(reply.attachments.len(), 1);
    assert_eq!(reply.attachments[0].identifier, "pikachu");
    assert_eq!(resolver_calls_containing(&harness, "xxxx"), 0);
    assert_eq!(resolver_calls_containing(&harness, ""), 1);
}

#[tokio::test]
async fn test_summary_error_status_skips_sprites() {
    let completion = MockCompletion::new()
        .with_reply("x".repeat(1900))
        .with_status_rule("Resume este texto", 429, "flash-lite quota exceeded")
        .with_fallback("flash-lite");
    let api = MockSpeciesApi::new().with_sprite("flash-lite", vec![1]);
    let harness = TestHarness::new(completion, api, &[]);

    let reply = harness.turn(USER, "Cuéntame todo").await.unwrap();

    assert_eq!(reply.text, "Error 429: flash-lite quota exceeded");
    assert!(reply.attachments.is_empty());
    assert_eq!(resolver_calls_containing(&harness, ""), 0);
    assert!(harness.species_api.sprite_lookups().is_empty());

    let history = harness.engine.sessions().history(USER).await;
    assert_eq!(history[1].content, reply.text);
}

#[tokio::test]
async fn test_failed_summary_truncates() {
    let too_long = "y".repeat(2500);
    let completion = MockCompletion::new()
        .with_reply(too_long)
        .with_transport_error("connection reset");
    let harness = TestHarness::new(completion, MockSpeciesApi::new(), &[]);

    let reply = harness.turn(USER, "Cuéntame todo").await.unwrap();

    assert_eq!(reply.text.chars().count(), 1900);
    assert!(reply.summarized);
}

// =============================================================================
// REFRESH COMMAND
// =============================================================================

#[tokio::test]
async fn test_refresh_command_short_circuits() {
    let completion = MockCompletion::new().with_fallback("should not be used");
    let api = MockSpeciesApi::new().with_species(["pikachu", "mew"]);
    let harness = TestHarness::new(completion, api, &[]);

    let reply = harness.turn(USER, "  UPDATE Pokemon List ").await.unwrap();

    assert_eq!(reply.text, REFRESH_CONFIRMATION);
    assert!(reply.attachments.is_empty());
    assert_eq!(harness.completion.call_count(), 0);
    assert_eq!(harness.species_api.listing_calls(), 1);
    assert!(harness.engine.species().is_known("mew").await);
    assert!(harness.engine.sessions().history(USER).await.is_empty());
}

#[tokio::test]
async fn test_failed_refresh_still_short_circuits() {
    let api = MockSpeciesApi::new().failing_listing();
    let harness = TestHarness::new(MockCompletion::new(), api, &["pikachu"]);

    let reply = harness.turn(USER, "actualizar lista pokemon").await.unwrap();

    assert_ne!(reply.text, REFRESH_CONFIRMATION);
    assert!(reply.attachments.is_empty());
    assert_eq!(harness.completion.call_count(), 0);
    assert!(harness.engine.species().is_known("pikachu").await);
}

// =============================================================================
// MENTIONS AND SPRITES
// =============================================================================

#[tokio::test]
async fn test_resolution_memoized_across_turns() {
    let completion = MockCompletion::new()
        .with_reply("Pikachu es genial")
        .with_reply("Pikachu es rápido")
        .with_rule(resolving("pikachu es"), "pikachu")
        .with_rule(ANY_RESOLUTION, "");
    let api = MockSpeciesApi::new().with_sprite("pikachu", vec![1]);
    let harness = TestHarness::new(completion, api, &["pikachu"]);

    harness.turn(USER, "a").await.unwrap();
    let second = harness.turn(USER, "b").await.unwrap();

    assert_eq!(second.text, "Pikachu es rápido");
    assert_eq!(second.attachments.len(), 1);
    assert_eq!(resolver_calls_containing(&harness, &resolving("pikachu es")), 1);
    // "pikachu es", "genial", "rápido"
    assert_eq!(harness.engine.resolver().memo_len().await, 3);
}

#[tokio::test]
async fn test_memo_capacity_from_config() {
    let config = EngineConfig::new().with_memo_limits(1, None);
    let completion = MockCompletion::new()
        .with_reply("Pikachu es genial")
        .with_reply("Pikachu es rápido")
        .with_rule(resolving("pikachu es"), "pikachu")
        .with_rule(ANY_RESOLUTION, "");
    let api = MockSpeciesApi::new().with_sprite("pikachu", vec![1]);
    let harness = TestHarness::with_config(config, completion, api, &["pikachu"]);

    harness.turn(USER, "a").await.unwrap();
    harness.turn(USER, "b").await.unwrap();

    // "genial" evicted "pikachu es", so the second turn resolves it again.
    assert_eq!(resolver_calls_containing(&harness, &resolving("pikachu es")), 2);
    assert_eq!(harness.engine.resolver().memo_len().await, 1);
}

#[tokio::test]
async fn test_one_known_among_noise() {
    let completion = MockCompletion::new()
        .with_reply("Pikachu. Uno. Dos. Tres. Cuatro. Cinco. Seis. Siete. Ocho. Nueve.")
        .with_rule(resolving("pikachu"), "pikachu")
        .with_rule(resolving("uno"), "uno");
    let api = MockSpeciesApi::new()
        .with_sprite("pikachu", vec![1])
        .with_sprite("uno", vec![2]);
    let harness = TestHarness::new(completion, api, &["pikachu"]);

    let reply = harness.turn(USER, "?").await.unwrap();

    assert_eq!(reply.attachments.len(), 1);
    assert_eq!(reply.attachments[0].identifier, "pikachu");
    // "uno" resolved but is neither listed nor hyphenated.
    assert_eq!(harness.species_api.sprite_lookups(), vec!["pikachu"]);
}

#[tokio::test]
async fn test_attachments_capped_at_ten() {
    let names: Vec<String> = (0..12).map(|i| format!("form-{i}")).collect();
    let text = names
        .iter()
        .map(|n| format!("{n}."))
        .collect::<Vec<_>>()
        .join(" ");

    let mut completion = MockCompletion::new().with_reply(text);
    let mut api = MockSpeciesApi::new();
    for name in &names {
        completion = completion.with_rule(resolving(name), name.clone());
        api = api.with_sprite(name.clone(), name.as_bytes().to_vec());
    }
    let harness = TestHarness::new(completion, api, &[]);

    let reply = harness.turn(USER, "?").await.unwrap();

    assert_eq!(reply.attachments.len(), 10);
    assert_eq!(harness.species_api.sprite_lookups().len(), 10);
}

#[tokio::test]
async fn test_failed_download_does_not_block_later_sprites() {
    let completion = MockCompletion::new()
        .with_reply("Missingno. Pikachu.")
        .with_rule(resolving("missingno"), "missing-no")
        .with_rule(resolving("pikachu"), "pikachu");
    let api = MockSpeciesApi::new()
        .with_broken_sprite("missing-no")
        .with_sprite("pikachu", vec![25]);
    let harness = TestHarness::new(completion, api, &["pikachu"]);

    let reply = harness.turn(USER, "?").await.unwrap();

    assert_eq!(harness.species_api.sprite_lookups(), vec!["missing-no", "pikachu"]);
    assert_eq!(reply.attachments.len(), 1);
    assert_eq!(reply.attachments[0].identifier, "pikachu");
}

#[tokio::test]
async fn test_duplicate_identifiers_fetched_once() {
    let completion = MockCompletion::new()
        .with_reply("Mew. El gran Mew.")
        .with_rule(resolving("mew"), "mew")
        .with_rule(resolving("el gran"), "mew");
    let api = MockSpeciesApi::new().with_sprite("mew", vec![151]);
    let harness = TestHarness::new(completion, api, &["mew"]);

    let reply = harness.turn(USER, "?").await.unwrap();

    assert_eq!(reply.attachments.len(), 1);
    assert_eq!(harness.species_api.sprite_lookups(), vec!["mew"]);
}

#[tokio::test]
async fn test_resolver_errors_skip_phrase() {
    let completion = MockCompletion::new()
        .with_reply("Snorlax. Pikachu.")
        .with_status_rule(resolving("snorlax"), 500, "boom")
        .with_rule(resolving("pikachu"), "pikachu");
    let api = MockSpeciesApi::new()
        .with_sprite("snorlax", vec![1])
        .with_sprite("pikachu", vec![2]);
    let harness = TestHarness::new(completion, api, &["snorlax", "pikachu"]);

    let reply = harness.turn(USER, "?").await.unwrap();

    assert_eq!(reply.attachments.len(), 1);
    assert_eq!(reply.attachments[0].identifier, "pikachu");
    assert_eq!(reply.text, "Snorlax. Pikachu.");
}

struct FixedMatcher(Vec<&'static str>);

impl MentionMatcher for FixedMatcher {
    fn candidates(&self, _reply: &str) -> Vec<String> {
        self.0.iter().map(|s| s.to_string()).collect()
    }
}

#[tokio::test]
async fn test_custom_matcher() {
    let completion = Arc::new(
        MockCompletion::new()
            .with_reply("Una respuesta sin nombres.")
            .with_rule(resolving("el ratón eléctrico"), "pikachu"),
    );
    let api = Arc::new(MockSpeciesApi::new().with_sprite("pikachu", vec![25]));
    let species = Arc::new(SpeciesCache::preloaded(
        std::env::temp_dir().join("oak-custom-matcher-unused.json"),
        api.clone(),
        ["pikachu".to_string()],
    ));

    let engine = ConversationEngine::new(EngineConfig::new(), completion, api, species)
        .with_matcher(FixedMatcher(vec!["el ratón eléctrico"]));

    let reply = engine.turn(USER, "?").await.unwrap();
    assert_eq!(reply.attachments.len(), 1);
}

// =============================================================================
// COMPLETION ERRORS
// =============================================================================

#[tokio::test]
async fn test_error_status_becomes_reply_text() {
    let completion = MockCompletion::new().with_status_error(429, "rate limited");
    let harness = TestHarness::new(completion, MockSpeciesApi::new(), &[]);

    let reply = harness.turn(USER, "Dime sobre Pikachu").await.unwrap();

    assert!(reply.text.contains("429"));
    assert!(reply.text.contains("rate limited"));
    assert!(reply.attachments.is_empty());
    assert_eq!(harness.completion.call_count(), 1);

    let history = harness.engine.sessions().history(USER).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].content, reply.text);
}

#[tokio::test]
async fn test_transport_error_fails_turn() {
    let completion = MockCompletion::new().with_transport_error("dns failure");
    let harness = TestHarness::new(completion, MockSpeciesApi::new(), &[]);

    let err = harness.turn(USER, "hola").await.unwrap_err();

    assert!(matches!(err, TurnError::Completion(_)));
    assert!(harness.engine.sessions().history(USER).await.is_empty());
}

// =============================================================================
// SPRITE COMMAND
// =============================================================================

#[tokio::test]
async fn test_sprite_command_found() {
    let completion =
        MockCompletion::new().with_rule(resolving("Mega Charizard X"), "charizard-mega-x");
    let api = MockSpeciesApi::new().with_sprite("charizard-mega-x", vec![6]);
    let harness = TestHarness::new(completion, api, &[]);

    let outcome = harness.engine.sprite("Mega Charizard X").await.unwrap();

    assert_eq!(
        outcome.message("Mega Charizard X"),
        "Sprite de **Mega Charizard X** (charizard-mega-x):"
    );
    let attachment = outcome.attachment().unwrap();
    assert_eq!(attachment.filename, "charizard-mega-x.png");
}

#[tokio::test]
async fn test_sprite_command_not_found() {
    let completion = MockCompletion::new().with_fallback("agumon");
    let harness = TestHarness::new(completion, MockSpeciesApi::new(), &[]);

    let outcome = harness.engine.sprite("Agumon").await.unwrap();

    assert_eq!(
        outcome,
        SpriteOutcome::NotFound {
            identifier: "agumon".to_string()
        }
    );
    assert!(outcome.attachment().is_none());
}

#[tokio::test]
async fn test_sprite_command_download_failed() {
    let completion = MockCompletion::new().with_fallback("ditto");
    let api = MockSpeciesApi::new().with_broken_sprite("ditto");
    let harness = TestHarness::new(completion, api, &[]);

    let outcome = harness.engine.sprite("Ditto").await.unwrap();

    assert!(matches!(outcome, SpriteOutcome::DownloadFailed { .. }));
    assert_eq!(outcome.message("Ditto"), "No se pudo descargar el sprite.");
}
