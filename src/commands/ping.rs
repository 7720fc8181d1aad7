//! `/ping`: liveness check with uptime.

use chrono::{DateTime, TimeDelta, Utc};
use serenity::async_trait;

use crate::context::AppContext;
use crate::discord::DiscordInteraction;
use crate::interaction::command::CommandSpec;
use crate::interaction::handler::CommandHandler;

pub struct PingCommand {
    spec: CommandSpec,
    started_at: DateTime<Utc>,
}

impl PingCommand {
    pub fn new(ctx: &AppContext) -> Self {
        Self {
            spec: CommandSpec::chat_input("ping", "Check that the bot is alive"),
            started_at: ctx.started_at,
        }
    }
}

#[async_trait]
impl CommandHandler<DiscordInteraction> for PingCommand {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn exec(&self, interaction: &DiscordInteraction) -> anyhow::Result<()> {
        let uptime = format_uptime(Utc::now() - self.started_at);
        interaction
            .reply(format!("Pong! Up for {}.", uptime), true)
            .await
    }
}

/// Render a duration as `1d 2h 3m 4s`, skipping leading zero units.
fn format_uptime(uptime: TimeDelta) -> String {
    let total = uptime.num_seconds().max(0);
    let units = [
        (total / 86_400, "d"),
        (total % 86_400 / 3_600, "h"),
        (total % 3_600 / 60, "m"),
        (total % 60, "s"),
    ];

    let parts: Vec<String> = units
        .iter()
        .skip_while(|(value, unit)| *value == 0 && *unit != "s")
        .map(|(value, unit)| format!("{}{}", value, unit))
        .collect();
    parts.join(" ")
}
