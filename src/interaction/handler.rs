//! Handler capabilities.
//!
//! Handlers are generic over the interaction carrier `I` so the dispatch core
//! does not depend on the gateway client. In the running bot `I` is
//! `DiscordInteraction`.

use serenity::async_trait;

use crate::interaction::command::CommandSpec;

/// Handler for one declared application command.
#[async_trait]
pub trait CommandHandler<I: Send + Sync + 'static>: Send + Sync {
    /// The declaration this handler answers to.
    fn spec(&self) -> &CommandSpec;

    async fn exec(&self, interaction: &I) -> anyhow::Result<()>;

    /// Autocomplete capability, if the command offers it.
    fn autocomplete(&self) -> Option<&dyn Autocomplete<I>> {
        None
    }
}

/// Autocomplete capability of a command handler.
#[async_trait]
pub trait Autocomplete<I: Send + Sync + 'static>: Send + Sync {
    async fn autocomplete(&self, interaction: &I) -> anyhow::Result<()>;
}

/// Handler owning every custom-id whose name part matches `name()`.
#[async_trait]
pub trait ComponentHandler<I: Send + Sync + 'static>: Send + Sync {
    fn name(&self) -> &str;

    /// `action` is the part of the custom-id after the separator.
    async fn exec(&self, interaction: &I, action: &str) -> anyhow::Result<()>;
}

/// Handler for submissions of one modal.
#[async_trait]
pub trait ModalHandler<I: Send + Sync + 'static>: Send + Sync {
    fn custom_id(&self) -> &str;

    async fn exec(&self, interaction: &I) -> anyhow::Result<()>;
}
