//! `Inspect` user context menu: basic facts about an account.

use anyhow::bail;
use chrono::{DateTime, Utc};
use serenity::all::ResolvedTarget;
use serenity::async_trait;

use crate::discord::DiscordInteraction;
use crate::interaction::command::CommandSpec;
use crate::interaction::handler::CommandHandler;

pub struct InspectCommand {
    spec: CommandSpec,
}

impl InspectCommand {
    pub fn new() -> Self {
        Self {
            spec: CommandSpec::user("Inspect"),
        }
    }
}

#[async_trait]
impl CommandHandler<DiscordInteraction> for InspectCommand {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn exec(&self, interaction: &DiscordInteraction) -> anyhow::Result<()> {
        let command = interaction.command()?;
        let Some(ResolvedTarget::User(user, _)) = command.data.target() else {
            bail!("Inspect was invoked without a target user");
        };

        let summary = describe_account(
            &user.name,
            user.id.get(),
            user.bot,
            user.id.created_at().unix_timestamp(),
            Utc::now(),
        );
        interaction.reply(summary, true).await
    }
}

fn describe_account(name: &str, id: u64, bot: bool, created_unix: i64, now: DateTime<Utc>) -> String {
    let age_days = (now.timestamp() - created_unix).max(0) / 86_400;
    let mut summary = format!(
        "**{}**\nId: `{}`\nCreated <t:{}:D> ({} days ago)",
        name, id, created_unix, age_days
    );
    if bot {
        summary.push_str("\nBot account");
    }
    summary
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_describe_account() {
        let now = Utc.with_ymd_and_hms(2024, 1, 11, 0, 0, 0).unwrap();
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap().timestamp();

        let summary = describe_account("ada", 42, false, created, now);

        assert!(summary.starts_with("**ada**"));
        assert!(summary.contains("Id: `42`"));
        assert!(summary.contains("(10 days ago)"));
        assert!(!summary.contains("Bot account"));
    }

    #[test]
    fn test_bot_accounts_are_flagged() {
        let now = Utc::now();
        let summary = describe_account("helper", 7, true, now.timestamp(), now);

        assert!(summary.contains("(0 days ago)"));
        assert!(summary.ends_with("Bot account"));
    }
}
