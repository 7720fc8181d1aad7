//! Discord bot client.
//!
//! Builds the serenity client, forwards gateway events into a channel and runs
//! the connection with exponential backoff until shutdown.

use std::sync::Arc;
use std::time::Duration;

use backon::BackoffBuilder;
use serenity::all::{ApplicationId, GuildId};
use serenity::async_trait;
use serenity::http::HttpBuilder;
use serenity::model::application::Interaction;
use serenity::model::gateway::Ready;
use serenity::model::guild::Guild;
use serenity::prelude::*;
use serenity::Client;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::common::error::{AppError, DiscordError, DiscordResult};
use crate::common::telemetry::Telemetry;
use crate::config::Config;
use crate::discord::handler::{BotHandler, DiscordInteraction};
use crate::interaction::dispatcher::InteractionDispatcher;
use crate::lifecycle::reconciler::ReconcileOptions;

const MAX_BACKOFF: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub enum DiscordBotEvent {
    /// Bot connected and ready.
    Ready { context: Context, ready: Ready },
    /// Guild data received; `is_new` is set when the bot just joined.
    GuildCreate {
        context: Context,
        guild_id: GuildId,
        is_new: bool,
    },
    /// Inbound interaction.
    Interaction {
        context: Context,
        interaction: Interaction,
    },
    Disconnected,
}

struct DiscordBotEvents {
    discord_events_tx: mpsc::UnboundedSender<DiscordBotEvent>,
}

impl DiscordBotEvents {
    fn new(discord_events_tx: mpsc::UnboundedSender<DiscordBotEvent>) -> Self {
        Self { discord_events_tx }
    }

    fn forward(&self, event: DiscordBotEvent) {
        if let Err(error) = self.discord_events_tx.send(event) {
            warn!("Failed to process discord event: {}", error);
        }
    }
}

#[async_trait]
impl EventHandler for DiscordBotEvents {
    async fn ready(&self, context: Context, ready: Ready) {
        self.forward(DiscordBotEvent::Ready { context, ready });
    }

    async fn guild_create(&self, context: Context, guild: Guild, is_new: Option<bool>) {
        self.forward(DiscordBotEvent::GuildCreate {
            context,
            guild_id: guild.id,
            is_new: is_new.unwrap_or(false),
        });
    }

    async fn interaction_create(&self, context: Context, interaction: Interaction) {
        self.forward(DiscordBotEvent::Interaction {
            context,
            interaction,
        });
    }
}

/// Builder for creating the Discord bot.
pub struct DiscordBotBuilder {
    config: Arc<Config>,
    dispatcher: Arc<InteractionDispatcher<DiscordInteraction>>,
    telemetry: Telemetry,
}

impl DiscordBotBuilder {
    pub fn new(
        config: Arc<Config>,
        dispatcher: Arc<InteractionDispatcher<DiscordInteraction>>,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            config,
            dispatcher,
            telemetry,
        }
    }

    /// Build the Discord bot.
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<DiscordBot, AppError> {
        let (commands, components, modals) = self.dispatcher.counts();
        info!(
            "Registered {} commands, {} components, {} modals",
            commands, components, modals
        );

        let (discord_events_tx, discord_events_rx) = mpsc::unbounded_channel::<DiscordBotEvent>();

        let token = self.config.discord.token.clone();
        let application_id = self.config.discord.application_id;
        let client = build_client(&token, application_id, discord_events_tx.clone()).await?;

        let options = ReconcileOptions {
            collect_garbage: self.config.collect_garbage(),
            sync_permissions: self.config.sync_permissions(),
        };
        let handler = BotHandler::new(self.dispatcher, options, self.telemetry);

        Ok(DiscordBot {
            client: Some(client),
            token,
            application_id,
            handler,
            discord_events_rx,
            discord_events_tx,
            shutdown_rx,
        })
    }
}

async fn build_client(
    token: &str,
    application_id: Option<u64>,
    discord_events_tx: mpsc::UnboundedSender<DiscordBotEvent>,
) -> DiscordResult<Client> {
    // Interactions arrive regardless of intents; GUILDS delivers guild joins.
    let intents = GatewayIntents::GUILDS;

    // Build a custom reqwest client with timeout settings
    let reqwest_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| DiscordError::RequestFailed {
            message: format!("failed to build HTTP client: {}", e),
        })?;

    let mut http = HttpBuilder::new(token).client(reqwest_client);
    if let Some(id) = application_id {
        http = http.application_id(ApplicationId::new(id));
    }

    let events = DiscordBotEvents::new(discord_events_tx);
    let client = serenity::client::ClientBuilder::new_with_http(http.build(), intents)
        .event_handler(events)
        .await?;
    Ok(client)
}

/// Exponential backoff for Discord reconnection.
/// 5s initial, 5min max, factor 1.1, with jitter, unlimited retries.
fn discord_backoff() -> impl Iterator<Item = Duration> {
    backon::ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(5))
        .with_max_delay(MAX_BACKOFF)
        .with_factor(1.1)
        .with_jitter()
        .without_max_times()
        .build()
}

pub struct DiscordBot {
    client: Option<Client>,
    token: String,
    application_id: Option<u64>,
    handler: BotHandler,
    discord_events_rx: mpsc::UnboundedReceiver<DiscordBotEvent>,
    discord_events_tx: mpsc::UnboundedSender<DiscordBotEvent>,
    shutdown_rx: watch::Receiver<bool>,
}

impl DiscordBot {
    pub async fn run(mut self) {
        let shard_manager = self.client.as_ref().map(|c| c.shard_manager.clone());
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::select! {
            _ = Self::run_connection(
                &mut self.client,
                &self.token,
                self.application_id,
                &self.discord_events_tx,
            ) => {},
            _ = Self::process_events(&mut self.discord_events_rx, &self.handler, &mut self.shutdown_rx) => {},
            _ = async {
                loop {
                    if shutdown_rx.changed().await.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                if let Some(ref manager) = shard_manager {
                    info!("Initiating graceful Discord shutdown...");
                    manager.shutdown_all().await;
                    info!("Discord shutdown complete");
                }
            } => {}
        }
        info!("Discord task ended");
    }

    async fn run_connection(
        client: &mut Option<Client>,
        token: &str,
        application_id: Option<u64>,
        discord_events_tx: &mpsc::UnboundedSender<DiscordBotEvent>,
    ) {
        let mut backoff = discord_backoff();

        loop {
            info!("Connecting to Discord...");

            let mut client = match client.take() {
                Some(client) => client,
                None => {
                    // serenity mostly handles reconnections itself.
                    match build_client(token, application_id, discord_events_tx.clone()).await {
                        Ok(client) => {
                            backoff = discord_backoff();
                            client
                        }
                        Err(e) => {
                            error!("Failed to rebuild Discord client: {}", e);
                            let delay = backoff.next().unwrap_or(MAX_BACKOFF);
                            warn!("Retrying in {:.1}s...", delay.as_secs_f64());
                            sleep(delay).await;
                            continue;
                        }
                    }
                }
            };

            match client.start().await {
                Ok(()) => {
                    info!("Discord client disconnected normally");
                    if let Err(error) = discord_events_tx.send(DiscordBotEvent::Disconnected) {
                        warn!("Failed to process discord event: {}", error);
                    }
                    break;
                }
                Err(e) => {
                    error!("Discord client error: {}", e);
                    let delay = backoff.next().unwrap_or(MAX_BACKOFF);
                    warn!(
                        "Discord disconnected. Reconnecting in {:.1}s...",
                        delay.as_secs_f64(),
                    );
                    if let Err(error) = discord_events_tx.send(DiscordBotEvent::Disconnected) {
                        warn!("Failed to process discord event: {}", error);
                    }
                    sleep(delay).await;
                }
            }
        }
    }

    async fn process_events(
        discord_events_rx: &mut mpsc::UnboundedReceiver<DiscordBotEvent>,
        handler: &BotHandler,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                event = discord_events_rx.recv() => {
                    match event {
                        Some(DiscordBotEvent::Ready { context, ready }) => {
                            handler.handle_ready(&context, &ready);
                        }
                        Some(DiscordBotEvent::GuildCreate { context, guild_id, is_new }) => {
                            if is_new {
                                handler.handle_guild_join(&context, guild_id);
                            } else {
                                debug!("Guild {} available", guild_id);
                            }
                        }
                        Some(DiscordBotEvent::Interaction { context, interaction }) => {
                            handler.handle_interaction(context, interaction);
                        }
                        Some(DiscordBotEvent::Disconnected) => {
                            debug!("Discord connection lost");
                        }
                        None => {
                            debug!("Discord events channel closed.");
                            break;
                        }
                    }
                }

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping event processing");
                        break;
                    }
                }
            }
        }
    }
}
