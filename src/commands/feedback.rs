//! `/feedback`: opens a modal; the submission is logged and acknowledged.

use serenity::all::{
    ActionRowComponent, CreateActionRow, CreateInputText, CreateInteractionResponse, CreateModal,
    InputTextStyle,
};
use serenity::async_trait;

use crate::common::telemetry::Telemetry;
use crate::context::AppContext;
use crate::discord::DiscordInteraction;
use crate::interaction::command::CommandSpec;
use crate::interaction::handler::{CommandHandler, ModalHandler};

pub const FEEDBACK_MODAL: &str = "feedback";
const MESSAGE_FIELD: &str = "message";
const MAX_FEEDBACK_LEN: u16 = 1000;

pub struct FeedbackCommand {
    spec: CommandSpec,
}

impl FeedbackCommand {
    pub fn new() -> Self {
        Self {
            spec: CommandSpec::chat_input("feedback", "Send feedback to the maintainers"),
        }
    }
}

#[async_trait]
impl CommandHandler<DiscordInteraction> for FeedbackCommand {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn exec(&self, interaction: &DiscordInteraction) -> anyhow::Result<()> {
        let modal = CreateModal::new(FEEDBACK_MODAL, "Feedback").components(vec![
            CreateActionRow::InputText(
                CreateInputText::new(InputTextStyle::Paragraph, "What's on your mind?", MESSAGE_FIELD)
                    .min_length(1)
                    .max_length(MAX_FEEDBACK_LEN),
            ),
        ]);
        interaction
            .respond(CreateInteractionResponse::Modal(modal))
            .await
    }
}

pub struct FeedbackModal {
    telemetry: Telemetry,
}

impl FeedbackModal {
    pub fn new(ctx: &AppContext) -> Self {
        Self {
            telemetry: ctx.telemetry.child("feedback"),
        }
    }
}

#[async_trait]
impl ModalHandler<DiscordInteraction> for FeedbackModal {
    fn custom_id(&self) -> &str {
        FEEDBACK_MODAL
    }

    async fn exec(&self, interaction: &DiscordInteraction) -> anyhow::Result<()> {
        let modal = interaction.modal()?;
        let submitted = modal
            .data
            .components
            .iter()
            .flat_map(|row| row.components.iter())
            .find_map(|component| match component {
                ActionRowComponent::InputText(input) if input.custom_id == MESSAGE_FIELD => {
                    input.value.as_deref()
                }
                _ => None,
            });

        let Some(feedback) = submitted.and_then(single_line) else {
            return interaction
                .reply("That feedback was empty, nothing was recorded.", true)
                .await;
        };

        self.telemetry.log(format!(
            "Feedback from {} ({}): {}",
            modal.user.name, modal.user.id, feedback
        ));
        interaction
            .reply("Thanks, your feedback was recorded.", true)
            .await
    }
}

/// Collapse a submission onto one log line; `None` when there is nothing in it.
fn single_line(text: &str) -> Option<String> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    (!lines.is_empty()).then(|| lines.join(" / "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line() {
        assert_eq!(single_line("  great bot  "), Some("great bot".to_string()));
        assert_eq!(
            single_line("first\n\n  second \n"),
            Some("first / second".to_string())
        );
    }

    #[test]
    fn test_blank_feedback_is_rejected() {
        assert_eq!(single_line(""), None);
        assert_eq!(single_line(" \n\t\n"), None);
    }
}
