//! Discord gateway handler for the `/oak` and `/sprite` commands.

use oak_core::{ConversationEngine, SpriteOutcome, TurnReply};
use serenity::all::{
    ActivityData, Command, CommandDataOption, CommandInteraction, CommandOptionType, Context,
    CreateAttachment, CreateCommand, CreateCommandOption, CreateInteractionResponseFollowup,
    EventHandler, Interaction, OnlineStatus, Ready,
};
use serenity::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Discord rejects messages longer than this.
const MESSAGE_LIMIT: usize = 2000;

const TURN_FAILED: &str = "El Profesor Oak no pudo responder en este momento.";

pub struct Handler {
    engine: Arc<ConversationEngine>,
}

impl Handler {
    pub fn new(engine: Arc<ConversationEngine>) -> Self {
        Self { engine }
    }

    async fn ask(&self, ctx: &Context, command: &CommandInteraction) {
        let Some(question) = string_option(&command.data.options, "pregunta") else {
            warn!("/oak without a question");
            return;
        };
        let user = command.user.id.get();
        debug!(user, question, "/oak");

        let followup = match self.engine.turn(user, question).await {
            Ok(reply) => reply_followup(reply),
            Err(e) => {
                error!(user, error = %e, "turn failed");
                CreateInteractionResponseFollowup::new().content(TURN_FAILED)
            }
        };
        send(ctx, command, followup).await;
    }

    async fn sprite(&self, ctx: &Context, command: &CommandInteraction) {
        let Some(description) = string_option(&command.data.options, "descripcion") else {
            warn!("/sprite without a description");
            return;
        };
        debug!(description, "/sprite");

        let followup = match self.engine.sprite(description).await {
            Ok(outcome) => {
                let followup =
                    CreateInteractionResponseFollowup::new().content(outcome.message(description));
                match outcome {
                    SpriteOutcome::Found { attachment, .. } => followup
                        .add_file(CreateAttachment::bytes(attachment.bytes, attachment.filename)),
                    _ => followup,
                }
            }
            Err(e) => {
                error!(description, error = %e, "sprite resolution failed");
                CreateInteractionResponseFollowup::new().content(TURN_FAILED)
            }
        };
        send(ctx, command, followup).await;
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("Discord bot connected as {}", ready.user.name);
        ctx.set_presence(Some(ActivityData::listening("/oak")), OnlineStatus::Online);

        match Command::set_global_commands(&ctx.http, commands()).await {
            Ok(registered) => info!(count = registered.len(), "slash commands registered"),
            Err(e) => error!("Failed to register slash commands: {}", e),
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };

        if let Err(e) = command.defer(&ctx.http).await {
            error!(command = %command.data.name, error = %e, "could not defer interaction");
            return;
        }

        match command.data.name.as_str() {
            "oak" => self.ask(&ctx, &command).await,
            "sprite" => self.sprite(&ctx, &command).await,
            other => warn!(command = other, "unknown command"),
        }
    }
}

fn commands() -> Vec<CreateCommand> {
    vec![
        CreateCommand::new("oak")
            .description("Preguntale al Profesor Oak sobre el mundo Pokémon.")
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "pregunta", "Tu pregunta")
                    .required(true),
            ),
        CreateCommand::new("sprite")
            .description("Obtén el sprite de un Pokémon o forma especial.")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "descripcion",
                    "Nombre o descripción del Pokémon",
                )
                .required(true),
            ),
    ]
}

fn string_option<'a>(options: &'a [CommandDataOption], name: &str) -> Option<&'a str> {
    options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| o.value.as_str())
}

fn reply_followup(reply: TurnReply) -> CreateInteractionResponseFollowup {
    let files = reply
        .attachments
        .into_iter()
        .map(|a| CreateAttachment::bytes(a.bytes, a.filename));
    CreateInteractionResponseFollowup::new()
        .content(clamp_message(&reply.text))
        .add_files(files)
}

/// Cut `text` to the platform's message limit.
fn clamp_message(text: &str) -> String {
    text.chars().take(MESSAGE_LIMIT).collect()
}

async fn send(ctx: &Context, command: &CommandInteraction, followup: CreateInteractionResponseFollowup) {
    if let Err(e) = command.create_followup(&ctx.http, followup).await {
        error!(command = %command.data.name, error = %e, "could not send follow-up");
    }
}
