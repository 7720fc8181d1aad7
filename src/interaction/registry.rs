//! Handler registries.
//!
//! Filled once from the static handler list at startup and read-only after
//! that, so no locking is involved. A later registration under an existing
//! identifier replaces the earlier one.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::interaction::command::{CommandKey, CommandKind, CommandSpec};
use crate::interaction::custom_id;
use crate::interaction::handler::{CommandHandler, ComponentHandler, ModalHandler};

/// Every handler the bot provides, in registration order.
pub struct Handlers<I: Send + Sync + 'static> {
    pub commands: Vec<Arc<dyn CommandHandler<I>>>,
    pub components: Vec<Arc<dyn ComponentHandler<I>>>,
    pub modals: Vec<Arc<dyn ModalHandler<I>>>,
}

impl<I: Send + Sync + 'static> Default for Handlers<I> {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            components: Vec::new(),
            modals: Vec::new(),
        }
    }
}

/// Commands keyed by `(name, kind)`.
pub struct CommandRegistry<I: Send + Sync + 'static> {
    handlers: HashMap<CommandKey, Arc<dyn CommandHandler<I>>>,
}

impl<I: Send + Sync + 'static> CommandRegistry<I> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn CommandHandler<I>>) {
        let key = handler.spec().key();
        if self.handlers.insert(key.clone(), handler).is_some() {
            warn!("Command {} registered twice; keeping the latest", key);
        }
    }

    pub fn lookup(&self, name: &str, kind: CommandKind) -> Option<&Arc<dyn CommandHandler<I>>> {
        self.handlers.get(&CommandKey::new(name, kind))
    }

    /// Declarations of every registered command, ordered by key.
    pub fn specs(&self) -> Vec<CommandSpec> {
        let mut specs: Vec<CommandSpec> = self
            .handlers
            .values()
            .map(|handler| handler.spec().clone())
            .collect();
        specs.sort_by_key(CommandSpec::key);
        specs
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<I: Send + Sync + 'static> Default for CommandRegistry<I> {
    fn default() -> Self {
        Self::new()
    }
}

/// Components keyed by the name part of their custom-ids.
pub struct ComponentRegistry<I: Send + Sync + 'static> {
    handlers: HashMap<String, Arc<dyn ComponentHandler<I>>>,
}

impl<I: Send + Sync + 'static> ComponentRegistry<I> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn ComponentHandler<I>>) {
        let name = handler.name().to_string();
        if self.handlers.insert(name.clone(), handler).is_some() {
            warn!("Component '{}' registered twice; keeping the latest", name);
        }
    }

    /// Resolve a wire custom-id to its handler and action.
    pub fn lookup<'a>(
        &self,
        custom_id: &'a str,
    ) -> Option<(&Arc<dyn ComponentHandler<I>>, &'a str)> {
        let (name, action) = custom_id::split(custom_id)?;
        self.handlers.get(name).map(|handler| (handler, action))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }
}

impl<I: Send + Sync + 'static> Default for ComponentRegistry<I> {
    fn default() -> Self {
        Self::new()
    }
}

/// Modals keyed by custom-id.
pub struct ModalRegistry<I: Send + Sync + 'static> {
    handlers: HashMap<String, Arc<dyn ModalHandler<I>>>,
}

impl<I: Send + Sync + 'static> ModalRegistry<I> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn ModalHandler<I>>) {
        let custom_id = handler.custom_id().to_string();
        if self.handlers.insert(custom_id.clone(), handler).is_some() {
            warn!("Modal '{}' registered twice; keeping the latest", custom_id);
        }
    }

    pub fn lookup(&self, custom_id: &str) -> Option<&Arc<dyn ModalHandler<I>>> {
        self.handlers.get(custom_id)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }
}

impl<I: Send + Sync + 'static> Default for ModalRegistry<I> {
    fn default() -> Self {
        Self::new()
    }
}
