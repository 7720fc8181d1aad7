//! `/help`: lists the bot's commands, with autocomplete over their names.

use serenity::all::{
    CommandData, CreateAutocompleteResponse, CreateInteractionResponse, ResolvedValue,
};
use serenity::async_trait;

use crate::discord::DiscordInteraction;
use crate::interaction::command::{CommandKind, CommandSpec, OptionKind, OptionSpec};
use crate::interaction::handler::{Autocomplete, CommandHandler};

/// Discord accepts at most 25 autocomplete choices.
const MAX_SUGGESTIONS: usize = 25;

struct Entry {
    name: String,
    kind: CommandKind,
    description: String,
}

pub struct HelpCommand {
    spec: CommandSpec,
    entries: Vec<Entry>,
}

impl HelpCommand {
    /// `declared` is every other command the bot registers.
    pub fn new(declared: &[CommandSpec]) -> Self {
        let spec = CommandSpec::chat_input("help", "List the bot's commands").option(
            OptionSpec::new(OptionKind::String, "command", "Show a single command")
                .autocomplete(true),
        );

        let mut entries: Vec<Entry> = declared
            .iter()
            .chain(std::iter::once(&spec))
            .map(|spec| Entry {
                name: spec.name().to_string(),
                kind: spec.kind(),
                description: spec.shape.description.clone(),
            })
            .collect();
        entries.sort_by(|a, b| (&a.name, a.kind).cmp(&(&b.name, b.kind)));

        Self { spec, entries }
    }

    /// Slash command names starting with `input`, case-insensitively.
    fn suggestions(&self, input: &str) -> Vec<&str> {
        let input = input.to_lowercase();
        self.entries
            .iter()
            .filter(|entry| entry.kind == CommandKind::ChatInput)
            .filter(|entry| entry.name.to_lowercase().starts_with(&input))
            .map(|entry| entry.name.as_str())
            .take(MAX_SUGGESTIONS)
            .collect()
    }

    fn describe(&self, name: Option<&str>) -> String {
        let lines: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| name.map_or(true, |name| entry.name.eq_ignore_ascii_case(name)))
            .map(|entry| match entry.kind {
                CommandKind::ChatInput => format!("`/{}` {}", entry.name, entry.description),
                kind => format!("`{}` ({})", entry.name, kind),
            })
            .collect();

        match (lines.is_empty(), name) {
            (true, Some(name)) => format!("No command named `{}`.", name),
            _ => lines.join("\n"),
        }
    }
}

/// What the user has typed so far into the focused option.
fn focused_input(data: &CommandData) -> &str {
    data.autocomplete()
        .map(|option| option.value)
        .unwrap_or_default()
}

#[async_trait]
impl CommandHandler<DiscordInteraction> for HelpCommand {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn exec(&self, interaction: &DiscordInteraction) -> anyhow::Result<()> {
        let command = interaction.command()?;
        let wanted = command
            .data
            .options()
            .into_iter()
            .find_map(|option| match option.value {
                ResolvedValue::String(value) if option.name == "command" => Some(value),
                _ => None,
            });

        interaction.reply(self.describe(wanted), true).await
    }

    fn autocomplete(&self) -> Option<&dyn Autocomplete<DiscordInteraction>> {
        Some(self)
    }
}

#[async_trait]
impl Autocomplete<DiscordInteraction> for HelpCommand {
    async fn autocomplete(&self, interaction: &DiscordInteraction) -> anyhow::Result<()> {
        let command = interaction.command()?;
        let response = self
            .suggestions(focused_input(&command.data))
            .into_iter()
            .fold(CreateAutocompleteResponse::new(), |response, name| {
                response.add_string_choice(name, name)
            });
        interaction
            .respond(CreateInteractionResponse::Autocomplete(response))
            .await
    }
}
