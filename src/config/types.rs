//! Configuration type definitions.

use serde::Deserialize;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub discord: DiscordConfig,
    pub commands: Option<CommandsConfig>,
    pub queue: Option<QueueConfig>,
    pub gateway: Option<GatewayConfig>,
}

impl Config {
    /// Whether stale remote commands are deleted. Defaults to on.
    pub fn collect_garbage(&self) -> bool {
        self.commands
            .as_ref()
            .and_then(|c| c.collect_garbage)
            .unwrap_or(true)
    }

    /// Whether guild permission overwrites are kept in sync. Defaults to on.
    pub fn sync_permissions(&self) -> bool {
        self.commands
            .as_ref()
            .and_then(|c| c.sync_permissions)
            .unwrap_or(true)
    }

    /// Pause between tasks of one queue, in milliseconds.
    pub fn queue_delay_ms(&self) -> u64 {
        self.queue.as_ref().and_then(|q| q.delay_ms).unwrap_or(0)
    }

    /// Gateway settings for a guild, if the guild is configured.
    pub fn gateway_guild(&self, guild_id: u64) -> Option<&GatewayGuild> {
        self.gateway
            .as_ref()?
            .guilds
            .iter()
            .find(|g| g.guild_id == guild_id)
    }
}

/// Discord bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    pub token: String,
    /// Only needed when the token does not carry the application id.
    pub application_id: Option<u64>,
}

/// Command registration behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandsConfig {
    pub collect_garbage: Option<bool>,
    pub sync_permissions: Option<bool>,
}

/// Task queue settings.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    pub delay_ms: Option<u64>,
}

/// Member approval gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub guilds: Vec<GatewayGuild>,
}

/// A guild where the gateway command is offered.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayGuild {
    pub guild_id: u64,
    /// Role granted to approved members.
    pub member_role: u64,
}
