//! Remote command registry.
//!
//! `CommandApi` is the reconciler's view of the platform: per-target command
//! lists, create/update/delete, and guild permission overwrites.
//! `SerenityCommandApi` backs it with the Discord HTTP API.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serenity::all::{
    Command, CommandId, CommandOption, CommandPermissionType, CreateCommandPermission,
    EditCommandPermissions, GuildId, Http,
};
use serenity::async_trait;

use crate::common::error::{DiscordError, DiscordResult};
use crate::interaction::command::{
    ChoiceValue, CommandKind, CommandShape, OptionChoice, OptionKind, OptionSpec,
    PermissionRule, PermissionTarget,
};

/// One remote command set: the global one or a guild's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    Global,
    Guild(GuildId),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Guild(guild) => write!(f, "guild {}", guild),
        }
    }
}

/// A registered command as the platform reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCommand {
    pub id: CommandId,
    pub shape: CommandShape,
}

impl RemoteCommand {
    /// Whether the record already has the declared shape.
    pub fn equals(&self, shape: &CommandShape) -> bool {
        self.shape == *shape
    }

    pub fn matches_key(&self, name: &str, kind: CommandKind) -> bool {
        self.shape.name == name && self.shape.kind == kind
    }
}

/// Platform operations used by reconciliation.
#[async_trait]
pub trait CommandApi: Send + Sync {
    async fn list(&self, target: Target) -> DiscordResult<Vec<RemoteCommand>>;

    async fn create(&self, target: Target, shape: &CommandShape) -> DiscordResult<RemoteCommand>;

    async fn update(
        &self,
        target: Target,
        id: CommandId,
        shape: &CommandShape,
    ) -> DiscordResult<RemoteCommand>;

    async fn delete(&self, target: Target, id: CommandId) -> DiscordResult<()>;

    /// Current permission overwrites of every command in a guild.
    async fn fetch_permissions(
        &self,
        guild: GuildId,
    ) -> DiscordResult<HashMap<CommandId, Vec<PermissionRule>>>;

    async fn set_permissions(
        &self,
        guild: GuildId,
        id: CommandId,
        rules: &[PermissionRule],
    ) -> DiscordResult<()>;
}

/// `CommandApi` over the Discord HTTP API.
#[derive(Clone)]
pub struct SerenityCommandApi {
    http: Arc<Http>,
}

impl SerenityCommandApi {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl CommandApi for SerenityCommandApi {
    async fn list(&self, target: Target) -> DiscordResult<Vec<RemoteCommand>> {
        let commands = match target {
            Target::Global => Command::get_global_commands(&self.http).await?,
            Target::Guild(guild) => guild.get_commands(&self.http).await?,
        };
        // Command types this bot never declares (e.g. entry points) are left alone.
        Ok(commands.iter().filter_map(remote_command).collect())
    }

    async fn create(&self, target: Target, shape: &CommandShape) -> DiscordResult<RemoteCommand> {
        let builder = shape.to_builder();
        let command = match target {
            Target::Global => Command::create_global_command(&self.http, builder).await?,
            Target::Guild(guild) => guild.create_command(&self.http, builder).await?,
        };
        require_known(&command)
    }

    async fn update(
        &self,
        target: Target,
        id: CommandId,
        shape: &CommandShape,
    ) -> DiscordResult<RemoteCommand> {
        let builder = shape.to_builder();
        let command = match target {
            Target::Global => Command::edit_global_command(&self.http, id, builder).await?,
            Target::Guild(guild) => guild.edit_command(&self.http, id, builder).await?,
        };
        require_known(&command)
    }

    async fn delete(&self, target: Target, id: CommandId) -> DiscordResult<()> {
        match target {
            Target::Global => Command::delete_global_command(&self.http, id).await?,
            Target::Guild(guild) => guild.delete_command(&self.http, id).await?,
        }
        Ok(())
    }

    async fn fetch_permissions(
        &self,
        guild: GuildId,
    ) -> DiscordResult<HashMap<CommandId, Vec<PermissionRule>>> {
        let permissions = guild.get_commands_permissions(&self.http).await?;
        Ok(permissions
            .into_iter()
            .map(|command| {
                let rules = command
                    .permissions
                    .iter()
                    .filter_map(|permission| {
                        let id = permission.id.get();
                        let target = match permission.kind {
                            CommandPermissionType::Role => PermissionTarget::Role(id),
                            CommandPermissionType::User => PermissionTarget::User(id),
                            CommandPermissionType::Channel => PermissionTarget::Channel(id),
                            _ => return None,
                        };
                        Some(PermissionRule {
                            target,
                            allow: permission.permission,
                        })
                    })
                    .collect();
                (command.id, rules)
            })
            .collect())
    }

    async fn set_permissions(
        &self,
        guild: GuildId,
        id: CommandId,
        rules: &[PermissionRule],
    ) -> DiscordResult<()> {
        let permissions = rules
            .iter()
            .map(|rule| match rule.target {
                PermissionTarget::Role(role) => CreateCommandPermission::role(role.into(), rule.allow),
                PermissionTarget::User(user) => CreateCommandPermission::user(user.into(), rule.allow),
                PermissionTarget::Channel(channel) => {
                    CreateCommandPermission::channel(channel.into(), rule.allow)
                }
            })
            .collect();
        guild
            .edit_command_permissions(&self.http, id, EditCommandPermissions::new(permissions))
            .await?;
        Ok(())
    }
}

fn require_known(command: &Command) -> DiscordResult<RemoteCommand> {
    remote_command(command).ok_or_else(|| DiscordError::UnsupportedCommandType {
        kind: format!("{:?}", command.kind),
    })
}

/// Normalise a platform command into the comparable shape.
fn remote_command(command: &Command) -> Option<RemoteCommand> {
    let kind = CommandKind::from_command_type(command.kind)?;
    Some(RemoteCommand {
        id: command.id,
        shape: CommandShape {
            kind,
            name: command.name.clone(),
            description: command.description.clone(),
            options: command.options.iter().filter_map(remote_option).collect(),
            default_member_permissions: command.default_member_permissions,
        },
    })
}

fn remote_option(option: &CommandOption) -> Option<OptionSpec> {
    let kind = OptionKind::from_option_type(option.kind)?;
    Some(OptionSpec {
        kind,
        name: option.name.clone(),
        description: option.description.clone(),
        required: option.required,
        autocomplete: option.autocomplete,
        choices: option
            .choices
            .iter()
            .filter_map(|choice| {
                Some(OptionChoice {
                    name: choice.name.clone(),
                    value: ChoiceValue::from_json(kind, &choice.value)?,
                })
            })
            .collect(),
        min_length: option.min_length,
        max_length: option.max_length,
        options: option.options.iter().filter_map(remote_option).collect(),
    })
}
