//! The bot's own commands, components and modals.

pub mod feedback;
pub mod gateway;
pub mod help;
pub mod inspect;
pub mod ping;

use std::sync::Arc;

use crate::context::AppContext;
use crate::discord::DiscordInteraction;
use crate::interaction::command::CommandSpec;
use crate::interaction::handler::CommandHandler;
use crate::interaction::registry::Handlers;

use feedback::{FeedbackCommand, FeedbackModal};
use gateway::{GatewayCommand, GatewayComponent};
use help::HelpCommand;
use inspect::InspectCommand;
use ping::PingCommand;

/// Every handler the bot registers at startup.
pub fn handlers(ctx: &AppContext) -> Handlers<DiscordInteraction> {
    let mut commands: Vec<Arc<dyn CommandHandler<DiscordInteraction>>> = vec![
        Arc::new(PingCommand::new(ctx)),
        Arc::new(InspectCommand::new()),
        Arc::new(FeedbackCommand::new()),
        Arc::new(GatewayCommand::new(ctx)),
    ];
    let declared: Vec<CommandSpec> = commands.iter().map(|c| c.spec().clone()).collect();
    commands.push(Arc::new(HelpCommand::new(&declared)));

    Handlers {
        commands,
        components: vec![Arc::new(GatewayComponent::new(ctx))],
        modals: vec![Arc::new(FeedbackModal::new(ctx))],
    }
}

#[cfg(test)]
mod tests {
    use serenity::all::GuildId;

    use super::*;
    use crate::common::telemetry::testing::recording;
    use crate::config::parser::load_config_str;
    use crate::config::Config;
    use crate::interaction::command::{CommandKind, CommandScope};
    use crate::interaction::dispatcher::InteractionDispatcher;

    fn make_test_config() -> Config {
        load_config_str(
            r#"
            discord { token = "abc" }
            gateway { guilds = [ { guild_id = 10, member_role = 20 } ] }
            "#,
        )
        .unwrap()
    }

    fn make_test_dispatcher() -> InteractionDispatcher<DiscordInteraction> {
        let (telemetry, _sink) = recording();
        let ctx = AppContext::new(make_test_config(), telemetry.clone());
        InteractionDispatcher::new(handlers(&ctx), telemetry)
    }

    #[test]
    fn test_handler_counts() {
        assert_eq!(make_test_dispatcher().counts(), (5, 1, 1));
    }

    #[test]
    fn test_declared_commands() {
        let specs = make_test_dispatcher().specs();
        let keys: Vec<(&str, CommandKind)> =
            specs.iter().map(|spec| (spec.name(), spec.kind())).collect();

        assert_eq!(
            keys,
            vec![
                ("Inspect", CommandKind::User),
                ("feedback", CommandKind::ChatInput),
                ("gateway", CommandKind::ChatInput),
                ("help", CommandKind::ChatInput),
                ("ping", CommandKind::ChatInput),
            ]
        );
    }

    #[tokio::test]
    async fn test_gateway_is_only_eligible_in_configured_guilds() {
        let specs = make_test_dispatcher().specs();
        let gateway = specs.iter().find(|spec| spec.name() == "gateway").unwrap();

        let CommandScope::Guild {
            eligible: Some(eligible),
            ..
        } = &gateway.scope
        else {
            panic!("gateway should be guild scoped with a predicate");
        };
        assert!(eligible(GuildId::new(10)).await.unwrap());
        assert!(!eligible(GuildId::new(11)).await.unwrap());

        let others_global = specs
            .iter()
            .filter(|spec| spec.name() != "gateway")
            .all(|spec| spec.scope.is_global());
        assert!(others_global);
    }
}
