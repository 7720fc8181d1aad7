//! Interaction dispatch core.

pub mod command;
pub mod custom_id;
pub mod dispatcher;
pub mod handler;
pub mod registry;

pub use dispatcher::InteractionDispatcher;
