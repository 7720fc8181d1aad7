//! Discord gateway integration.
//!
//! Connects the dispatch and lifecycle core to serenity: the client and its
//! reconnect loop, and the handler turning gateway events into core work.

pub mod client;
pub mod handler;

pub use client::DiscordBotBuilder;
pub use handler::DiscordInteraction;
