//! Member approval gateway.
//!
//! `/gateway member:<user>` posts a review panel with approve and deny
//! buttons. Decisions go through the guild's task queue, so two reviewers
//! clicking at once are applied one after the other and the second sees the
//! first one's result.

use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, bail};
use serenity::all::{
    ButtonStyle, CreateActionRow, CreateButton, CreateInteractionResponse,
    CreateInteractionResponseMessage, GuildId, Http, Permissions, ResolvedValue, RoleId, UserId,
};
use serenity::async_trait;

use crate::common::error::CustomIdError;
use crate::common::queue::QueueRegistry;
use crate::common::telemetry::Telemetry;
use crate::config::Config;
use crate::context::AppContext;
use crate::discord::DiscordInteraction;
use crate::interaction::command::{CommandSpec, OptionKind, OptionSpec};
use crate::interaction::custom_id;
use crate::interaction::handler::{CommandHandler, ComponentHandler};

pub const GATEWAY: &str = "gateway";
const AUDIT_REASON: &str = "Approved through the gateway";

/// A reviewer's decision on one member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve(UserId),
    Deny(UserId),
}

impl Decision {
    pub fn user(self) -> UserId {
        match self {
            Self::Approve(user) | Self::Deny(user) => user,
        }
    }

    /// The action part of the button custom-id.
    fn action(self) -> String {
        match self {
            Self::Approve(user) => format!("approve:{}", user),
            Self::Deny(user) => format!("deny:{}", user),
        }
    }

    fn parse(action: &str) -> Option<Self> {
        let (verb, user) = action.split_once(':')?;
        let user = user.parse::<u64>().ok().filter(|id| *id != 0)?;
        match verb {
            "approve" => Some(Self::Approve(UserId::new(user))),
            "deny" => Some(Self::Deny(UserId::new(user))),
            _ => None,
        }
    }

    pub fn custom_id(self) -> Result<String, CustomIdError> {
        custom_id::compose(GATEWAY, &self.action())
    }
}

/// What applying a decision did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Approved,
    AlreadyMember,
    Denied,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Approved => "approved",
            Self::AlreadyMember => "found already approved",
            Self::Denied => "denied",
        })
    }
}

fn panel_text(member: UserId) -> String {
    format!("Access request from <@{}>", member)
}

fn verdict_text(verdict: Verdict, member: UserId, reviewer: UserId) -> String {
    match verdict {
        Verdict::Approved => format!("<@{}> was approved by <@{}>.", member, reviewer),
        Verdict::AlreadyMember => format!("<@{}> had already been approved.", member),
        Verdict::Denied => format!("<@{}> was denied by <@{}>.", member, reviewer),
    }
}

pub struct GatewayCommand {
    spec: CommandSpec,
}

impl GatewayCommand {
    pub fn new(ctx: &AppContext) -> Self {
        let config = Arc::clone(&ctx.config);
        let spec = CommandSpec::chat_input(GATEWAY, "Review a member's access request")
            .option(OptionSpec::new(OptionKind::User, "member", "Member to review").required(true))
            .default_member_permissions(Permissions::MANAGE_ROLES)
            .eligible_when(move |guild| {
                let enabled = config.gateway_guild(guild.get()).is_some();
                async move { Ok(enabled) }
            });
        Self { spec }
    }
}

#[async_trait]
impl CommandHandler<DiscordInteraction> for GatewayCommand {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn exec(&self, interaction: &DiscordInteraction) -> anyhow::Result<()> {
        let command = interaction.command()?;
        let member = command
            .data
            .options()
            .into_iter()
            .find_map(|option| match option.value {
                ResolvedValue::User(user, _) if option.name == "member" => Some(user.id),
                _ => None,
            })
            .ok_or_else(|| anyhow!("Missing required option 'member'"))?;

        let buttons = vec![
            CreateButton::new(Decision::Approve(member).custom_id()?)
                .label("Approve")
                .style(ButtonStyle::Success),
            CreateButton::new(Decision::Deny(member).custom_id()?)
                .label("Deny")
                .style(ButtonStyle::Danger),
        ];

        interaction
            .respond(CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(panel_text(member))
                    .components(vec![CreateActionRow::Buttons(buttons)]),
            ))
            .await
    }
}

pub struct GatewayComponent {
    config: Arc<Config>,
    queues: Arc<QueueRegistry<GuildId>>,
    telemetry: Telemetry,
}

impl GatewayComponent {
    pub fn new(ctx: &AppContext) -> Self {
        Self {
            config: Arc::clone(&ctx.config),
            queues: Arc::clone(&ctx.queues),
            telemetry: ctx.telemetry.child(GATEWAY),
        }
    }
}

#[async_trait]
impl ComponentHandler<DiscordInteraction> for GatewayComponent {
    fn name(&self) -> &str {
        GATEWAY
    }

    async fn exec(&self, interaction: &DiscordInteraction, action: &str) -> anyhow::Result<()> {
        let component = interaction.component()?;
        let Some(decision) = Decision::parse(action) else {
            bail!("Malformed gateway action '{}'", action);
        };
        let guild = component
            .guild_id
            .ok_or_else(|| anyhow!("Gateway panel used outside a guild"))?;
        let Some(settings) = self.config.gateway_guild(guild.get()) else {
            return interaction
                .reply("The gateway is not enabled in this server.", true)
                .await;
        };

        let role = RoleId::new(settings.member_role);
        let http = Arc::clone(&interaction.ctx.http);
        let verdict = self
            .queues
            .enqueue(guild, move || async move {
                apply(&http, guild, decision, role).await
            })
            .await??;

        let reviewer = component.user.id;
        self.telemetry.log(format!(
            "Member {} {} by {} in guild {}",
            decision.user(),
            verdict,
            reviewer,
            guild
        ));

        interaction
            .respond(CreateInteractionResponse::UpdateMessage(
                CreateInteractionResponseMessage::new()
                    .content(verdict_text(verdict, decision.user(), reviewer))
                    .components(Vec::new()),
            ))
            .await
    }
}

async fn apply(
    http: &Http,
    guild: GuildId,
    decision: Decision,
    role: RoleId,
) -> serenity::Result<Verdict> {
    match decision {
        Decision::Approve(user) => {
            let member = guild.member(http, user).await?;
            if member.roles.contains(&role) {
                return Ok(Verdict::AlreadyMember);
            }
            http.add_member_role(guild, user, role, Some(AUDIT_REASON))
                .await?;
            Ok(Verdict::Approved)
        }
        Decision::Deny(_) => Ok(Verdict::Denied),
    }
}
