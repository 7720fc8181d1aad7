//! Application command declarations.
//!
//! A `CommandSpec` is what the bot declares; a `CommandShape` is the part of
//! it the platform stores and that reconciliation compares. Identity is the
//! `(name, kind)` pair, so a slash command and a user-context command may share
//! a name.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serenity::all::{
    CommandOptionType, CommandType, CreateCommand, CreateCommandOption, GuildId, Permissions,
};

/// Kind of application command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandKind {
    ChatInput,
    User,
    Message,
}

impl CommandKind {
    pub fn from_command_type(kind: CommandType) -> Option<Self> {
        match kind {
            CommandType::ChatInput => Some(Self::ChatInput),
            CommandType::User => Some(Self::User),
            CommandType::Message => Some(Self::Message),
            _ => None,
        }
    }

    pub fn to_command_type(self) -> CommandType {
        match self {
            Self::ChatInput => CommandType::ChatInput,
            Self::User => CommandType::User,
            Self::Message => CommandType::Message,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::ChatInput => "chat-input",
            Self::User => "user-context",
            Self::Message => "message-context",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Registry key of a command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandKey {
    pub name: String,
    pub kind: CommandKind,
}

impl CommandKey {
    pub fn new(name: impl Into<String>, kind: CommandKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.name)
    }
}

/// Option value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    SubCommand,
    SubCommandGroup,
    String,
    Integer,
    Boolean,
    User,
    Channel,
    Role,
    Mentionable,
    Number,
    Attachment,
}

impl OptionKind {
    pub fn from_option_type(kind: CommandOptionType) -> Option<Self> {
        Some(match kind {
            CommandOptionType::SubCommand => Self::SubCommand,
            CommandOptionType::SubCommandGroup => Self::SubCommandGroup,
            CommandOptionType::String => Self::String,
            CommandOptionType::Integer => Self::Integer,
            CommandOptionType::Boolean => Self::Boolean,
            CommandOptionType::User => Self::User,
            CommandOptionType::Channel => Self::Channel,
            CommandOptionType::Role => Self::Role,
            CommandOptionType::Mentionable => Self::Mentionable,
            CommandOptionType::Number => Self::Number,
            CommandOptionType::Attachment => Self::Attachment,
            _ => return None,
        })
    }

    pub fn to_option_type(self) -> CommandOptionType {
        match self {
            Self::SubCommand => CommandOptionType::SubCommand,
            Self::SubCommandGroup => CommandOptionType::SubCommandGroup,
            Self::String => CommandOptionType::String,
            Self::Integer => CommandOptionType::Integer,
            Self::Boolean => CommandOptionType::Boolean,
            Self::User => CommandOptionType::User,
            Self::Channel => CommandOptionType::Channel,
            Self::Role => CommandOptionType::Role,
            Self::Mentionable => CommandOptionType::Mentionable,
            Self::Number => CommandOptionType::Number,
            Self::Attachment => CommandOptionType::Attachment,
        }
    }
}

/// A fixed choice offered for an option.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionChoice {
    pub name: String,
    pub value: ChoiceValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChoiceValue {
    String(String),
    Integer(i32),
    Number(f64),
}

impl ChoiceValue {
    /// Decode a choice value as registered under an option of `kind`.
    ///
    /// `Number` choices come back as plain integers when they are integral.
    pub fn from_json(kind: OptionKind, value: &serde_json::Value) -> Option<Self> {
        match kind {
            OptionKind::String => value.as_str().map(|s| Self::String(s.to_string())),
            OptionKind::Integer => value
                .as_i64()
                .and_then(|i| i32::try_from(i).ok())
                .map(Self::Integer),
            OptionKind::Number => value.as_f64().map(Self::Number),
            _ => None,
        }
    }
}

/// One node of a command's option tree.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionSpec {
    pub kind: OptionKind,
    pub name: String,
    pub description: String,
    pub required: bool,
    pub autocomplete: bool,
    pub choices: Vec<OptionChoice>,
    pub min_length: Option<u16>,
    pub max_length: Option<u16>,
    pub options: Vec<OptionSpec>,
}

impl OptionSpec {
    pub fn new(kind: OptionKind, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            description: description.into(),
            required: false,
            autocomplete: false,
            choices: Vec::new(),
            min_length: None,
            max_length: None,
            options: Vec::new(),
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn autocomplete(mut self, autocomplete: bool) -> Self {
        self.autocomplete = autocomplete;
        self
    }

    pub fn choice(mut self, name: impl Into<String>, value: ChoiceValue) -> Self {
        self.choices.push(OptionChoice {
            name: name.into(),
            value,
        });
        self
    }

    pub fn length(mut self, min: Option<u16>, max: Option<u16>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    pub fn sub_option(mut self, option: OptionSpec) -> Self {
        self.options.push(option);
        self
    }

    fn to_builder(&self) -> CreateCommandOption {
        let mut builder =
            CreateCommandOption::new(self.kind.to_option_type(), &self.name, &self.description)
                .required(self.required)
                .set_autocomplete(self.autocomplete);

        for choice in &self.choices {
            builder = match &choice.value {
                ChoiceValue::String(value) => builder.add_string_choice(&choice.name, value),
                ChoiceValue::Integer(value) => builder.add_int_choice(&choice.name, *value),
                ChoiceValue::Number(value) => builder.add_number_choice(&choice.name, *value),
            };
        }
        if let Some(min) = self.min_length {
            builder = builder.min_length(min);
        }
        if let Some(max) = self.max_length {
            builder = builder.max_length(max);
        }
        for option in &self.options {
            builder = builder.add_sub_option(option.to_builder());
        }
        builder
    }
}

/// Everything about a command that the platform stores and compares.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandShape {
    pub kind: CommandKind,
    pub name: String,
    pub description: String,
    pub options: Vec<OptionSpec>,
    pub default_member_permissions: Option<Permissions>,
}

impl CommandShape {
    pub fn key(&self) -> CommandKey {
        CommandKey::new(self.name.clone(), self.kind)
    }

    /// Registration payload for the Discord API.
    pub fn to_builder(&self) -> CreateCommand {
        let mut builder = CreateCommand::new(&self.name).kind(self.kind.to_command_type());

        // Context menu commands must not carry a description.
        if self.kind == CommandKind::ChatInput {
            builder = builder
                .description(&self.description)
                .set_options(self.options.iter().map(OptionSpec::to_builder).collect());
        }
        if let Some(permissions) = self.default_member_permissions {
            builder = builder.default_member_permissions(permissions);
        }
        builder
    }
}

/// Who a permission overwrite applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PermissionTarget {
    Role(u64),
    User(u64),
    Channel(u64),
}

/// A single guild-level permission overwrite for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PermissionRule {
    pub target: PermissionTarget,
    pub allow: bool,
}

/// Async guild eligibility check. An `Err` counts as "not eligible".
pub type GuildPredicate = Arc<dyn Fn(GuildId) -> BoxFuture<'static, anyhow::Result<bool>> + Send + Sync>;

/// Where a command is registered.
#[derive(Clone, Default)]
pub enum CommandScope {
    #[default]
    Global,
    Guild {
        eligible: Option<GuildPredicate>,
        permissions: Vec<PermissionRule>,
    },
}

impl CommandScope {
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }
}

impl fmt::Debug for CommandScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("Global"),
            Self::Guild {
                eligible,
                permissions,
            } => f
                .debug_struct("Guild")
                .field("has_predicate", &eligible.is_some())
                .field("permissions", permissions)
                .finish(),
        }
    }
}

/// A locally declared command.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub shape: CommandShape,
    pub scope: CommandScope,
}

impl CommandSpec {
    fn new(kind: CommandKind, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            shape: CommandShape {
                kind,
                name: name.into(),
                description: description.into(),
                options: Vec::new(),
                default_member_permissions: None,
            },
            scope: CommandScope::Global,
        }
    }

    /// Slash command.
    pub fn chat_input(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(CommandKind::ChatInput, name, description)
    }

    /// User context menu command.
    pub fn user(name: impl Into<String>) -> Self {
        Self::new(CommandKind::User, name, "")
    }

    /// Message context menu command.
    pub fn message(name: impl Into<String>) -> Self {
        Self::new(CommandKind::Message, name, "")
    }

    pub fn option(mut self, option: OptionSpec) -> Self {
        self.shape.options.push(option);
        self
    }

    pub fn default_member_permissions(mut self, permissions: Permissions) -> Self {
        self.shape.default_member_permissions = Some(permissions);
        self
    }

    /// Register per guild instead of globally.
    pub fn guild_scoped(mut self) -> Self {
        if self.scope.is_global() {
            self.scope = CommandScope::Guild {
                eligible: None,
                permissions: Vec::new(),
            };
        }
        self
    }

    /// Restrict registration to guilds accepted by `predicate`. Implies guild scope.
    pub fn eligible_when<F, Fut>(mut self, predicate: F) -> Self
    where
        F: Fn(GuildId) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        let predicate: GuildPredicate = Arc::new(move |guild| predicate(guild).boxed());
        self = self.guild_scoped();
        if let CommandScope::Guild { eligible, .. } = &mut self.scope {
            *eligible = Some(predicate);
        }
        self
    }

    /// Permission overwrites to keep in sync in every guild. Implies guild scope.
    pub fn permission(mut self, rule: PermissionRule) -> Self {
        self = self.guild_scoped();
        if let CommandScope::Guild { permissions, .. } = &mut self.scope {
            permissions.push(rule);
        }
        self
    }

    pub fn key(&self) -> CommandKey {
        self.shape.key()
    }

    pub fn name(&self) -> &str {
        &self.shape.name
    }

    pub fn kind(&self) -> CommandKind {
        self.shape.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_name_and_kind() {
        let slash = CommandSpec::chat_input("inspect", "Inspect something");
        let context = CommandSpec::user("inspect");

        assert_ne!(slash.key(), context.key());
        assert_eq!(slash.key(), CommandKey::new("inspect", CommandKind::ChatInput));
    }

    #[test]
    fn test_context_commands_have_no_description() {
        let spec = CommandSpec::message("Report");
        assert_eq!(spec.shape.description, "");
        assert_eq!(spec.kind(), CommandKind::Message);
    }

    #[test]
    fn test_guild_scope_builders() {
        let spec = CommandSpec::chat_input("gateway", "Review a member")
            .permission(PermissionRule {
                target: PermissionTarget::Role(42),
                allow: true,
            })
            .eligible_when(|_guild| async { Ok(true) });

        match &spec.scope {
            CommandScope::Guild {
                eligible,
                permissions,
            } => {
                assert!(eligible.is_some());
                assert_eq!(permissions.len(), 1);
            }
            CommandScope::Global => panic!("expected guild scope"),
        }
    }

    #[test]
    fn test_shape_equality_covers_option_tree() {
        let base = CommandSpec::chat_input("help", "Show help").option(
            OptionSpec::new(OptionKind::String, "command", "Command name").autocomplete(true),
        );
        let changed = CommandSpec::chat_input("help", "Show help").option(
            OptionSpec::new(OptionKind::String, "command", "Command name").autocomplete(false),
        );

        assert_eq!(base.shape, base.clone().shape);
        assert_ne!(base.shape, changed.shape);
    }

    #[test]
    fn test_choice_value_from_json() {
        assert_eq!(
            ChoiceValue::from_json(OptionKind::String, &serde_json::json!("a")),
            Some(ChoiceValue::String("a".to_string()))
        );
        assert_eq!(
            ChoiceValue::from_json(OptionKind::Integer, &serde_json::json!(5)),
            Some(ChoiceValue::Integer(5))
        );
        assert_eq!(
            ChoiceValue::from_json(OptionKind::Number, &serde_json::json!(1.5)),
            Some(ChoiceValue::Number(1.5))
        );
        assert_eq!(
            ChoiceValue::from_json(OptionKind::String, &serde_json::json!(null)),
            None
        );
    }

    #[test]
    fn test_integral_number_choice_keeps_its_kind() {
        assert_eq!(
            ChoiceValue::from_json(OptionKind::Number, &serde_json::json!(2)),
            Some(ChoiceValue::Number(2.0))
        );
        assert_eq!(
            ChoiceValue::from_json(OptionKind::Integer, &serde_json::json!(2.5)),
            None
        );
        assert_eq!(
            ChoiceValue::from_json(OptionKind::Integer, &serde_json::json!(i64::MAX)),
            None
        );
        assert_eq!(
            ChoiceValue::from_json(OptionKind::Boolean, &serde_json::json!(true)),
            None
        );
    }
}
