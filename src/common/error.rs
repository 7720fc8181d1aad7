//! Error types for the application.

use thiserror::Error;

/// Top-level application error.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Discord error: {0}")]
    Discord(#[from] DiscordError),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {message}")]
    IoError { path: String, message: String },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

/// Discord-related errors.
#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("Discord request failed: {message}")]
    RequestFailed { message: String },

    #[error("Unsupported remote command type: {kind}")]
    UnsupportedCommandType { kind: String },

    #[error("Serenity error: {0}")]
    Serenity(#[from] serenity::Error),
}

/// Errors raised while composing a component custom-id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CustomIdError {
    #[error("Custom-id part '{part}' is empty")]
    EmptyPart { part: &'static str },

    #[error("Custom-id {part} '{value}' contains the reserved separator")]
    ReservedSeparator { part: &'static str, value: String },

    #[error("Custom-id '{custom_id}' does not split back into its parts")]
    Ambiguous { custom_id: String },

    #[error("Custom-id is {len} characters long (limit {limit})")]
    TooLong { len: usize, limit: usize },
}

/// Errors surfaced to a task queue caller when its task could not settle normally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Queued task panicked")]
    Panicked,

    #[error("Queue runner dropped the task before it settled")]
    Dropped,
}

/// Errors reported by the interaction dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Command '{name}' received an autocomplete request but does not support autocomplete")]
    AutocompleteUnsupported { name: String },

    #[error("Handler '{origin}' failed: {source}")]
    HandlerFailed {
        origin: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Handler '{origin}' panicked")]
    HandlerPanicked { origin: String },
}

/// Result type alias for Discord operations.
pub type DiscordResult<T> = std::result::Result<T, DiscordError>;
