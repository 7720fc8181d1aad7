//! Command lifecycle: keeping the platform's registered commands in step with
//! the local declarations.

pub mod api;
pub mod reconciler;
