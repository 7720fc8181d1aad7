//! Environment variable overrides for configuration.
//!
//! - `PARALLAX_DISCORD_TOKEN` - Discord bot token
//! - `PARALLAX_QUEUE_DELAY_MS` - pause between queued tasks
//! - `PARALLAX_CONFIG` - config file path

use std::env;

use crate::config::types::{Config, QueueConfig};

/// Environment variable prefix for all config overrides.
const ENV_PREFIX: &str = "PARALLAX";

/// Apply environment variable overrides to a config.
pub fn apply_env_overrides(config: Config) -> Config {
    apply_overrides(config, |name| env::var(format!("{}_{}", ENV_PREFIX, name)).ok())
}

fn apply_overrides(mut config: Config, lookup: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(token) = lookup("DISCORD_TOKEN") {
        config.discord.token = token;
    }

    if let Some(delay) = lookup("QUEUE_DELAY_MS") {
        match delay.parse() {
            Ok(delay_ms) => {
                config
                    .queue
                    .get_or_insert(QueueConfig { delay_ms: None })
                    .delay_ms = Some(delay_ms);
            }
            Err(_) => tracing::warn!(
                "Ignoring {}_QUEUE_DELAY_MS: '{}' is not a number",
                ENV_PREFIX,
                delay
            ),
        }
    }

    config
}

/// Get the config file path from environment or use default.
///
/// Checks `PARALLAX_CONFIG`, otherwise returns "parallax.conf".
pub fn get_config_path() -> String {
    env::var(format!("{}_CONFIG", ENV_PREFIX)).unwrap_or_else(|_| "parallax.conf".to_string())
}
