//! Scoped telemetry for the dispatch and lifecycle core.
//!
//! A `Telemetry` value carries the stack of scope names it was created under
//! (for example `["dispatcher", "command", "ping"]`) and reports through a
//! pluggable sink. Reporting is fire-and-forget: sinks must not block.

use std::fmt::Display;
use std::sync::Arc;

use tracing::{error, info};

/// Destination for telemetry lines.
pub trait TelemetrySink: Send + Sync {
    fn log(&self, origin: &str, message: &str);
    fn error(&self, origin: &str, message: &str);
}

/// Sink that forwards every line to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn log(&self, origin: &str, message: &str) {
        info!(origin, "{}", message);
    }

    fn error(&self, origin: &str, message: &str) {
        error!(origin, "{}", message);
    }
}

/// Telemetry handle scoped to a dotted origin.
#[derive(Clone)]
pub struct Telemetry {
    sink: Arc<dyn TelemetrySink>,
    scope: Vec<String>,
}

impl Telemetry {
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            sink,
            scope: Vec::new(),
        }
    }

    /// Telemetry backed by `tracing`.
    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingSink))
    }

    /// Derive a handle one scope deeper. The parent is left untouched.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut scope = self.scope.clone();
        scope.push(name.into());
        Self {
            sink: Arc::clone(&self.sink),
            scope,
        }
    }

    pub fn origin(&self) -> String {
        self.scope.join(".")
    }

    pub fn log(&self, message: impl Display) {
        self.sink.log(&self.origin(), &message.to_string());
    }

    pub fn error(&self, message: impl Display) {
        self.sink.error(&self.origin(), &message.to_string());
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("origin", &self.origin())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::{Arc, Mutex};

    use super::{Telemetry, TelemetrySink};

    /// Sink that keeps every line in memory.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub logs: Mutex<Vec<(String, String)>>,
        pub errors: Mutex<Vec<(String, String)>>,
    }

    impl RecordingSink {
        pub fn logs(&self) -> Vec<(String, String)> {
            self.logs.lock().unwrap().clone()
        }

        pub fn errors(&self) -> Vec<(String, String)> {
            self.errors.lock().unwrap().clone()
        }
    }

    impl TelemetrySink for RecordingSink {
        fn log(&self, origin: &str, message: &str) {
            self.logs
                .lock()
                .unwrap()
                .push((origin.to_string(), message.to_string()));
        }

        fn error(&self, origin: &str, message: &str) {
            self.errors
                .lock()
                .unwrap()
                .push((origin.to_string(), message.to_string()));
        }
    }

    pub fn recording() -> (Telemetry, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (Telemetry::new(sink.clone()), sink)
    }
}
