//! Configuration validation.
//!
//! Collects every problem into one error so they can all be fixed at once.

use std::collections::HashSet;

use crate::common::error::ConfigError;
use crate::config::types::Config;

/// Validate a configuration and return detailed errors.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.discord.token.is_empty() {
        errors.push("discord.token is required".to_string());
    }
    if config.discord.token == "YOUR_DISCORD_TOKEN_HERE" {
        errors.push("discord.token has not been configured (still using placeholder)".to_string());
    }
    if config.discord.application_id == Some(0) {
        errors.push("discord.application_id must be non-zero".to_string());
    }

    if let Some(ref gateway) = config.gateway {
        let mut seen = HashSet::new();
        for (i, guild) in gateway.guilds.iter().enumerate() {
            if guild.guild_id == 0 {
                errors.push(format!("gateway.guilds[{}].guild_id must be non-zero", i));
            }
            if guild.member_role == 0 {
                errors.push(format!("gateway.guilds[{}].member_role must be non-zero", i));
            }
            if !seen.insert(guild.guild_id) {
                errors.push(format!(
                    "gateway.guilds[{}].guild_id {} is listed more than once",
                    i, guild.guild_id
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}
