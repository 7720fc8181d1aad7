//! Parallax - Discord community bot
//!
//! Declares application commands, keeps their registrations in sync with
//! Discord and routes every inbound interaction to its handler.

mod commands;
mod common;
mod config;
mod context;
mod discord;
mod interaction;
mod lifecycle;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use common::telemetry::Telemetry;
use config::{env::get_config_path, load_and_validate};
use context::AppContext;
use discord::DiscordBotBuilder;
use interaction::InteractionDispatcher;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Parallax v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = get_config_path();
    info!("Loading configuration from {}...", config_path);

    let config = load_and_validate(&config_path).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        error!("Please ensure {} exists and is properly formatted.", config_path);
        e
    })?;

    info!("Configuration loaded successfully");
    info!("  Garbage collection: {}", config.collect_garbage());
    info!("  Permission sync: {}", config.sync_permissions());
    info!("  Queue delay: {}ms", config.queue_delay_ms());
    info!(
        "  Gateway guilds: {}",
        config.gateway.as_ref().map_or(0, |g| g.guilds.len())
    );

    let telemetry = Telemetry::tracing();
    let ctx = AppContext::new(config, telemetry.clone());
    let dispatcher = Arc::new(InteractionDispatcher::new(
        commands::handlers(&ctx),
        telemetry.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let discord_bot = DiscordBotBuilder::new(Arc::clone(&ctx.config), dispatcher, telemetry)
        .build(shutdown_rx)
        .await?;

    info!("Starting Discord bot...");
    let mut discord_task = tokio::spawn(async move {
        discord_bot.run().await;
    });

    // Idle guild queues are dropped periodically.
    let queues = Arc::clone(&ctx.queues);
    let prune_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(600));
        loop {
            interval.tick().await;
            let pruned = queues.prune();
            if pruned > 0 {
                debug!("Pruned {} idle task queues ({} left)", pruned, queues.len());
            }
        }
    });

    let shutdown = tokio::select! {
        biased;
        _ = shutdown_signal() => {
            info!("Shutdown signal received - disconnecting...");
            true
        }
        _ = &mut discord_task => false,
    };

    if shutdown {
        if let Err(e) = shutdown_tx.send(true) {
            debug!("Shutdown channel closed (Discord task already exited): {}", e);
        }
        match tokio::time::timeout(Duration::from_secs(5), discord_task).await {
            Ok(Ok(())) => info!("Discord client stopped gracefully"),
            Ok(Err(e)) => warn!("Discord task panicked: {}", e),
            Err(_) => warn!("Discord shutdown timed out"),
        }
    }
    prune_task.abort();

    info!("Exiting...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
