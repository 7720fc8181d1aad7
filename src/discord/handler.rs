//! Discord gateway event handling.
//!
//! Turns forwarded gateway events into work for the core: command
//! reconciliation when the bot becomes ready or joins a guild, and one
//! dispatch task per inbound interaction.

use std::sync::Arc;

use anyhow::bail;
use serenity::all::{
    CommandInteraction, ComponentInteraction, Context, CreateInteractionResponse,
    CreateInteractionResponseMessage, GuildId, Interaction, ModalInteraction, Ready,
};
use tracing::{debug, error, info};

use crate::common::queue::TaskQueue;
use crate::common::telemetry::Telemetry;
use crate::interaction::command::{CommandKind, CommandSpec};
use crate::interaction::dispatcher::{Inbound, InteractionDispatcher, Route};
use crate::lifecycle::api::SerenityCommandApi;
use crate::lifecycle::reconciler::{CommandReconciler, Outcome, ReconcileOptions, Status};

/// An inbound interaction together with the gateway context it arrived on.
pub struct DiscordInteraction {
    pub ctx: Context,
    pub interaction: Interaction,
}

impl Inbound for DiscordInteraction {
    fn route(&self) -> Route<'_> {
        match &self.interaction {
            Interaction::Command(command) => match CommandKind::from_command_type(command.data.kind) {
                Some(kind) => Route::Command {
                    name: &command.data.name,
                    kind,
                },
                None => Route::Unknown,
            },
            Interaction::Autocomplete(command) => Route::Autocomplete {
                name: &command.data.name,
            },
            Interaction::Component(component) => Route::Component {
                custom_id: &component.data.custom_id,
            },
            Interaction::Modal(modal) => Route::Modal {
                custom_id: &modal.data.custom_id,
            },
            _ => Route::Unknown,
        }
    }
}

impl DiscordInteraction {
    pub fn command(&self) -> anyhow::Result<&CommandInteraction> {
        match &self.interaction {
            Interaction::Command(command) | Interaction::Autocomplete(command) => Ok(command),
            _ => bail!("Expected a command interaction"),
        }
    }

    pub fn component(&self) -> anyhow::Result<&ComponentInteraction> {
        match &self.interaction {
            Interaction::Component(component) => Ok(component),
            _ => bail!("Expected a component interaction"),
        }
    }

    pub fn modal(&self) -> anyhow::Result<&ModalInteraction> {
        match &self.interaction {
            Interaction::Modal(modal) => Ok(modal),
            _ => bail!("Expected a modal submission"),
        }
    }

    /// Send the initial response to the interaction.
    pub async fn respond(&self, response: CreateInteractionResponse) -> anyhow::Result<()> {
        let http = &self.ctx.http;
        match &self.interaction {
            Interaction::Command(command) | Interaction::Autocomplete(command) => {
                command.create_response(http, response).await?
            }
            Interaction::Component(component) => component.create_response(http, response).await?,
            Interaction::Modal(modal) => modal.create_response(http, response).await?,
            _ => bail!("Interaction cannot be responded to"),
        }
        Ok(())
    }

    /// Reply with a plain message.
    pub async fn reply(&self, content: impl Into<String>, ephemeral: bool) -> anyhow::Result<()> {
        self.respond(CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(content)
                .ephemeral(ephemeral),
        ))
        .await
    }
}

/// Reacts to forwarded gateway events.
pub struct BotHandler {
    dispatcher: Arc<InteractionDispatcher<DiscordInteraction>>,
    specs: Arc<Vec<CommandSpec>>,
    options: ReconcileOptions,
    /// Reconciliation passes run one at a time.
    passes: TaskQueue,
    telemetry: Telemetry,
}

impl BotHandler {
    pub fn new(
        dispatcher: Arc<InteractionDispatcher<DiscordInteraction>>,
        options: ReconcileOptions,
        telemetry: Telemetry,
    ) -> Self {
        let specs = Arc::new(dispatcher.specs());
        Self {
            dispatcher,
            specs,
            options,
            passes: TaskQueue::new(),
            telemetry,
        }
    }

    fn reconciler(&self, ctx: &Context) -> CommandReconciler<SerenityCommandApi> {
        CommandReconciler::new(
            Arc::new(SerenityCommandApi::new(Arc::clone(&ctx.http))),
            self.options,
            self.telemetry.clone(),
        )
    }

    /// Startup pass over every guild the bot is in.
    pub fn handle_ready(&self, ctx: &Context, ready: &Ready) {
        info!(
            "Discord bot connected as {} ({} guilds)",
            ready.user.name,
            ready.guilds.len()
        );

        let guilds: Vec<GuildId> = ready.guilds.iter().map(|guild| guild.id).collect();
        let reconciler = self.reconciler(ctx);
        let specs = Arc::clone(&self.specs);

        let pass = self
            .passes
            .enqueue(move || async move { reconciler.reconcile_all(&specs, &guilds).await });
        tokio::spawn(async move {
            match pass.await {
                Ok(outcomes) => log_summary("Startup", &outcomes),
                Err(e) => error!("Startup command reconciliation did not finish: {}", e),
            }
        });
    }

    /// Guild-join pass for a guild the bot was just added to.
    pub fn handle_guild_join(&self, ctx: &Context, guild: GuildId) {
        info!("Joined guild {}", guild);

        let reconciler = self.reconciler(ctx);
        let specs = Arc::clone(&self.specs);

        let pass = self
            .passes
            .enqueue(move || async move { reconciler.reconcile_guild(&specs, guild).await });
        tokio::spawn(async move {
            match pass.await {
                Ok(outcomes) => log_summary(&format!("Guild {}", guild), &outcomes),
                Err(e) => error!("Command reconciliation for guild {} did not finish: {}", guild, e),
            }
        });
    }

    /// Dispatch runs on its own task so a slow handler never blocks the event loop.
    pub fn handle_interaction(&self, ctx: Context, interaction: Interaction) {
        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            let interaction = DiscordInteraction { ctx, interaction };
            let outcome = dispatcher.dispatch(&interaction).await;
            debug!(
                "Interaction {} settled: {:?}",
                interaction.interaction.id(),
                outcome
            );
        });
    }
}

/// Per-status counts of one reconciliation pass.
#[derive(Debug, Default, PartialEq, Eq)]
struct Tally {
    created: usize,
    updated: usize,
    deleted: usize,
    unchanged: usize,
    permissions: usize,
    failed: usize,
}

fn tally(outcomes: &[Outcome]) -> Tally {
    let mut tally = Tally::default();
    for outcome in outcomes {
        let counter = match outcome.status {
            Status::Created => &mut tally.created,
            Status::Updated => &mut tally.updated,
            Status::Deleted => &mut tally.deleted,
            Status::Unchanged => &mut tally.unchanged,
            Status::PermissionsSynced => &mut tally.permissions,
            Status::Failed => &mut tally.failed,
        };
        *counter += 1;
    }
    tally
}

fn log_summary(pass: &str, outcomes: &[Outcome]) {
    let t = tally(outcomes);
    let summary = format!(
        "{} command reconciliation finished: {} created, {} updated, {} deleted, {} unchanged, {} permission syncs, {} failed",
        pass, t.created, t.updated, t.deleted, t.unchanged, t.permissions, t.failed
    );
    if t.failed > 0 {
        error!("{}", summary);
    } else {
        info!("{}", summary);
    }
}
