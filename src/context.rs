//! Shared application context handed to every handler at construction.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serenity::all::GuildId;

use crate::common::queue::QueueRegistry;
use crate::common::telemetry::Telemetry;
use crate::config::Config;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub telemetry: Telemetry,
    /// Serializes guild-level mutations (roles, channels) per guild.
    pub queues: Arc<QueueRegistry<GuildId>>,
    pub started_at: DateTime<Utc>,
}

impl AppContext {
    pub fn new(config: Config, telemetry: Telemetry) -> Self {
        let delay = Duration::from_millis(config.queue_delay_ms());
        Self {
            config: Arc::new(config),
            telemetry,
            queues: Arc::new(QueueRegistry::new(delay)),
            started_at: Utc::now(),
        }
    }
}
