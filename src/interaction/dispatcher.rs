//! Interaction routing.
//!
//! Every inbound interaction is classified by kind, resolved against the
//! matching registry and handed to exactly one handler. Lookup misses are
//! silent, handler failures and panics are reported through telemetry and
//! never escape `dispatch`. The dispatcher does not serialize anything; a
//! handler that mutates shared state routes that work through a `TaskQueue`.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::debug;

use crate::common::error::DispatchError;
use crate::common::telemetry::Telemetry;
use crate::interaction::command::{CommandKind, CommandSpec};
use crate::interaction::registry::{CommandRegistry, ComponentRegistry, Handlers, ModalRegistry};

/// Kind-specific routing data of an inbound interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Command { name: &'a str, kind: CommandKind },
    Autocomplete { name: &'a str },
    Component { custom_id: &'a str },
    Modal { custom_id: &'a str },
    Unknown,
}

/// An interaction the dispatcher can classify.
pub trait Inbound: Send + Sync + 'static {
    fn route(&self) -> Route<'_>;
}

/// Why an interaction was dropped without running a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    UnknownKind,
    UnknownCommand,
    UnknownComponent,
    UnknownModal,
}

/// Terminal state of one dispatched interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Completed,
    Failed,
    Dropped(DropReason),
}

pub struct InteractionDispatcher<I: Inbound> {
    commands: CommandRegistry<I>,
    components: ComponentRegistry<I>,
    modals: ModalRegistry<I>,
    telemetry: Telemetry,
}

impl<I: Inbound> InteractionDispatcher<I> {
    pub fn new(handlers: Handlers<I>, telemetry: Telemetry) -> Self {
        let mut commands = CommandRegistry::new();
        for handler in handlers.commands {
            commands.register(handler);
        }
        let mut components = ComponentRegistry::new();
        for handler in handlers.components {
            components.register(handler);
        }
        let mut modals = ModalRegistry::new();
        for handler in handlers.modals {
            modals.register(handler);
        }

        Self {
            commands,
            components,
            modals,
            telemetry: telemetry.child("dispatcher"),
        }
    }

    /// Declarations of every registered command.
    pub fn specs(&self) -> Vec<CommandSpec> {
        self.commands.specs()
    }

    /// Registered (commands, components, modals).
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.commands.len(),
            self.components.len(),
            self.modals.len(),
        )
    }

    pub async fn dispatch(&self, interaction: &I) -> DispatchOutcome {
        match interaction.route() {
            Route::Command { name, kind } => {
                let Some(handler) = self.commands.lookup(name, kind) else {
                    debug!("No handler for {} command '{}'", kind, name);
                    return DispatchOutcome::Dropped(DropReason::UnknownCommand);
                };
                let telemetry = self.telemetry.child("command").child(name);
                Self::execute(&telemetry, handler.exec(interaction)).await
            }
            Route::Autocomplete { name } => {
                let Some(handler) = self.commands.lookup(name, CommandKind::ChatInput) else {
                    debug!("No handler for autocomplete of '{}'", name);
                    return DispatchOutcome::Dropped(DropReason::UnknownCommand);
                };
                let telemetry = self.telemetry.child("autocomplete").child(name);
                match handler.autocomplete() {
                    Some(autocomplete) => {
                        Self::execute(&telemetry, autocomplete.autocomplete(interaction)).await
                    }
                    None => {
                        telemetry.error(DispatchError::AutocompleteUnsupported {
                            name: name.to_string(),
                        });
                        DispatchOutcome::Failed
                    }
                }
            }
            Route::Component { custom_id } => {
                let Some((handler, action)) = self.components.lookup(custom_id) else {
                    debug!("No component owns custom-id '{}'", custom_id);
                    return DispatchOutcome::Dropped(DropReason::UnknownComponent);
                };
                let telemetry = self.telemetry.child("component").child(handler.name());
                Self::execute(&telemetry, handler.exec(interaction, action)).await
            }
            Route::Modal { custom_id } => {
                let Some(handler) = self.modals.lookup(custom_id) else {
                    debug!("No modal registered for '{}'", custom_id);
                    return DispatchOutcome::Dropped(DropReason::UnknownModal);
                };
                let telemetry = self.telemetry.child("modal").child(custom_id);
                Self::execute(&telemetry, handler.exec(interaction)).await
            }
            Route::Unknown => DispatchOutcome::Dropped(DropReason::UnknownKind),
        }
    }

    async fn execute<F>(telemetry: &Telemetry, run: F) -> DispatchOutcome
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        match AssertUnwindSafe(run).catch_unwind().await {
            Ok(Ok(())) => DispatchOutcome::Completed,
            Ok(Err(source)) => {
                telemetry.error(DispatchError::HandlerFailed {
                    origin: telemetry.origin(),
                    source,
                });
                DispatchOutcome::Failed
            }
            Err(_) => {
                telemetry.error(DispatchError::HandlerPanicked {
                    origin: telemetry.origin(),
                });
                DispatchOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::bail;
    use serenity::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::common::telemetry::testing::{recording, RecordingSink};
    use crate::interaction::handler::{
        Autocomplete, CommandHandler, ComponentHandler, ModalHandler,
    };

    /// Owned stand-in for a gateway interaction.
    enum FakeInteraction {
        Command(String, CommandKind),
        Autocomplete(String),
        Component(String),
        Modal(String),
        Ping,
    }

    impl Inbound for FakeInteraction {
        fn route(&self) -> Route<'_> {
            match self {
                Self::Command(name, kind) => Route::Command { name, kind: *kind },
                Self::Autocomplete(name) => Route::Autocomplete { name },
                Self::Component(custom_id) => Route::Component { custom_id },
                Self::Modal(custom_id) => Route::Modal { custom_id },
                Self::Ping => Route::Unknown,
            }
        }
    }

    type Calls = Arc<Mutex<Vec<String>>>;

    enum Behaviour {
        Succeed,
        Fail,
        Panic,
        Sleep(Duration),
    }

    struct TestCommand {
        spec: CommandSpec,
        behaviour: Behaviour,
        calls: Calls,
        suggest: Option<TestAutocomplete>,
    }

    struct TestAutocomplete {
        calls: Calls,
    }

    #[async_trait]
    impl Autocomplete<FakeInteraction> for TestAutocomplete {
        async fn autocomplete(&self, _interaction: &FakeInteraction) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("autocomplete".to_string());
            Ok(())
        }
    }

    #[async_trait]
    impl CommandHandler<FakeInteraction> for TestCommand {
        fn spec(&self) -> &CommandSpec {
            &self.spec
        }

        async fn exec(&self, _interaction: &FakeInteraction) -> anyhow::Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.spec.kind(), self.spec.name()));
            match self.behaviour {
                Behaviour::Succeed => Ok(()),
                Behaviour::Fail => bail!("database unavailable"),
                Behaviour::Panic => panic!("handler bug"),
                Behaviour::Sleep(duration) => {
                    tokio::time::sleep(duration).await;
                    Ok(())
                }
            }
        }

        fn autocomplete(&self) -> Option<&dyn Autocomplete<FakeInteraction>> {
            self.suggest
                .as_ref()
                .map(|suggest| suggest as &dyn Autocomplete<FakeInteraction>)
        }
    }

    struct TestComponent {
        calls: Calls,
    }

    #[async_trait]
    impl ComponentHandler<FakeInteraction> for TestComponent {
        fn name(&self) -> &str {
            "gateway"
        }

        async fn exec(&self, _interaction: &FakeInteraction, action: &str) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(format!("gateway:{action}"));
            Ok(())
        }
    }

    struct TestModal {
        calls: Calls,
    }

    #[async_trait]
    impl ModalHandler<FakeInteraction> for TestModal {
        fn custom_id(&self) -> &str {
            "feedback"
        }

        async fn exec(&self, _interaction: &FakeInteraction) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("modal:feedback".to_string());
            Ok(())
        }
    }

    fn command(
        spec: CommandSpec,
        behaviour: Behaviour,
        calls: &Calls,
    ) -> Arc<dyn CommandHandler<FakeInteraction>> {
        Arc::new(TestCommand {
            spec,
            behaviour,
            calls: Arc::clone(calls),
            suggest: None,
        })
    }

    fn make_dispatcher() -> (
        InteractionDispatcher<FakeInteraction>,
        Calls,
        Arc<RecordingSink>,
    ) {
        let calls: Calls = Arc::default();
        let (telemetry, sink) = recording();

        let help: Arc<dyn CommandHandler<FakeInteraction>> = Arc::new(TestCommand {
            spec: CommandSpec::chat_input("help", "Show help"),
            behaviour: Behaviour::Succeed,
            calls: Arc::clone(&calls),
            suggest: Some(TestAutocomplete {
                calls: Arc::clone(&calls),
            }),
        });

        let handlers = Handlers {
            commands: vec![
                command(CommandSpec::chat_input("ping", "Ping"), Behaviour::Succeed, &calls),
                command(CommandSpec::user("ping"), Behaviour::Succeed, &calls),
                command(CommandSpec::chat_input("broken", "Fails"), Behaviour::Fail, &calls),
                command(CommandSpec::chat_input("bug", "Panics"), Behaviour::Panic, &calls),
                command(
                    CommandSpec::chat_input("slow", "Sleeps"),
                    Behaviour::Sleep(Duration::from_millis(50)),
                    &calls,
                ),
                help,
            ],
            components: vec![Arc::new(TestComponent {
                calls: Arc::clone(&calls),
            }) as Arc<dyn ComponentHandler<FakeInteraction>>],
            modals: vec![Arc::new(TestModal {
                calls: Arc::clone(&calls),
            }) as Arc<dyn ModalHandler<FakeInteraction>>],
        };

        (InteractionDispatcher::new(handlers, telemetry), calls, sink)
    }

    fn calls_of(calls: &Calls) -> Vec<String> {
        calls.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_command_routes_by_name_and_kind() {
        let (dispatcher, calls, sink) = make_dispatcher();

        let slash = FakeInteraction::Command("ping".to_string(), CommandKind::ChatInput);
        let context = FakeInteraction::Command("ping".to_string(), CommandKind::User);

        assert_eq!(dispatcher.dispatch(&slash).await, DispatchOutcome::Completed);
        assert_eq!(dispatcher.dispatch(&context).await, DispatchOutcome::Completed);
        assert_eq!(
            calls_of(&calls),
            vec!["chat-input:ping", "user-context:ping"]
        );
        assert!(sink.errors().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_command_is_silent() {
        let (dispatcher, calls, sink) = make_dispatcher();

        let missing = FakeInteraction::Command("ping".to_string(), CommandKind::Message);
        assert_eq!(
            dispatcher.dispatch(&missing).await,
            DispatchOutcome::Dropped(DropReason::UnknownCommand)
        );
        assert!(calls_of(&calls).is_empty());
        assert!(sink.errors().is_empty());
    }

    #[tokio::test]
    async fn test_component_miss_is_silent() {
        let (dispatcher, calls, sink) = make_dispatcher();

        for custom_id in ["music__skip", "gateway", "gateway__a__b", "__approve", ""] {
            let interaction = FakeInteraction::Component(custom_id.to_string());
            assert_eq!(
                dispatcher.dispatch(&interaction).await,
                DispatchOutcome::Dropped(DropReason::UnknownComponent)
            );
        }
        assert!(calls_of(&calls).is_empty());
        assert!(sink.errors().is_empty());
    }

    #[tokio::test]
    async fn test_component_receives_action() {
        let (dispatcher, calls, _sink) = make_dispatcher();

        let click = FakeInteraction::Component("gateway__approve:42".to_string());
        assert_eq!(dispatcher.dispatch(&click).await, DispatchOutcome::Completed);
        assert_eq!(calls_of(&calls), vec!["gateway:approve:42"]);
    }

    #[tokio::test]
    async fn test_modal_routes_by_custom_id() {
        let (dispatcher, calls, _sink) = make_dispatcher();

        let submit = FakeInteraction::Modal("feedback".to_string());
        assert_eq!(dispatcher.dispatch(&submit).await, DispatchOutcome::Completed);

        let stale = FakeInteraction::Modal("survey".to_string());
        assert_eq!(
            dispatcher.dispatch(&stale).await,
            DispatchOutcome::Dropped(DropReason::UnknownModal)
        );
        assert_eq!(calls_of(&calls), vec!["modal:feedback"]);
    }

    #[tokio::test]
    async fn test_unknown_kind_is_dropped() {
        let (dispatcher, _calls, sink) = make_dispatcher();

        assert_eq!(
            dispatcher.dispatch(&FakeInteraction::Ping).await,
            DispatchOutcome::Dropped(DropReason::UnknownKind)
        );
        assert!(sink.errors().is_empty());
    }

    #[tokio::test]
    async fn test_autocomplete_runs_capability() {
        let (dispatcher, calls, sink) = make_dispatcher();

        let request = FakeInteraction::Autocomplete("help".to_string());
        assert_eq!(dispatcher.dispatch(&request).await, DispatchOutcome::Completed);
        assert_eq!(calls_of(&calls), vec!["autocomplete"]);
        assert!(sink.errors().is_empty());
    }

    #[tokio::test]
    async fn test_autocomplete_without_capability_is_reported() {
        let (dispatcher, calls, sink) = make_dispatcher();

        let request = FakeInteraction::Autocomplete("ping".to_string());
        assert_eq!(dispatcher.dispatch(&request).await, DispatchOutcome::Failed);
        assert!(calls_of(&calls).is_empty());

        let errors = sink.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "dispatcher.autocomplete.ping");
        assert!(errors[0].1.contains("does not support autocomplete"));
    }

    #[tokio::test]
    async fn test_handler_error_is_reported_not_propagated() {
        let (dispatcher, _calls, sink) = make_dispatcher();

        let broken = FakeInteraction::Command("broken".to_string(), CommandKind::ChatInput);
        assert_eq!(dispatcher.dispatch(&broken).await, DispatchOutcome::Failed);

        let errors = sink.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "dispatcher.command.broken");
        assert!(errors[0].1.contains("database unavailable"));

        // Later interactions are unaffected.
        let ping = FakeInteraction::Command("ping".to_string(), CommandKind::ChatInput);
        assert_eq!(dispatcher.dispatch(&ping).await, DispatchOutcome::Completed);
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let (dispatcher, _calls, sink) = make_dispatcher();

        let bug = FakeInteraction::Command("bug".to_string(), CommandKind::ChatInput);
        assert_eq!(dispatcher.dispatch(&bug).await, DispatchOutcome::Failed);
        assert!(sink.errors()[0].1.contains("panicked"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_does_not_serialize_handlers() {
        let (dispatcher, calls, _sink) = make_dispatcher();
        let slow = FakeInteraction::Command("slow".to_string(), CommandKind::ChatInput);
        let started = Instant::now();

        let (first, second) = tokio::join!(dispatcher.dispatch(&slow), dispatcher.dispatch(&slow));

        assert_eq!(first, DispatchOutcome::Completed);
        assert_eq!(second, DispatchOutcome::Completed);
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(calls_of(&calls).len(), 2);
    }

    #[test]
    fn test_counts_and_specs() {
        let (dispatcher, _calls, _sink) = make_dispatcher();
        assert_eq!(dispatcher.counts(), (6, 1, 1));
        assert_eq!(dispatcher.specs().len(), 6);
    }
}
