//! Atomic jobs
//!
//! Every administrative operation implements [`JobRunner`]. A dispatcher
//! only ever sees the trait: it hands over a raw payload, runs the job and,
//! on failure, may re-run it up to the declared retry budget. Because every
//! step is idempotent, re-running from the top is always the recovery path.

mod agent_config;
mod agent_install;
mod registry;
mod schema_check;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::JobError;

pub use agent_install::AgentInstallJob;
pub use registry::JobRegistry;
pub use schema_check::SchemaCheckJob;

/// Uniform lifecycle of an atomic job
#[async_trait]
pub trait JobRunner: Send {
    /// Registry name of the job
    fn name(&self) -> &'static str;

    /// Decodes and validates the payload
    ///
    /// Nothing on the node is mutated before this succeeds.
    async fn init(&mut self, payload: &str) -> Result<(), JobError>;

    /// Executes the job's steps in order, stopping at the first error
    async fn run(&mut self) -> Result<(), JobError>;

    /// How many re-invocations the dispatcher may attempt
    fn retry(&self) -> u32;

    /// Best-effort undo after a failed run
    async fn rollback(&mut self) -> Result<(), JobError>;

    /// Example payload for operator tooling
    fn example(&self) -> JsonValue;

    /// Summary of what the last run did
    fn output(&self) -> Option<JsonValue> {
        None
    }
}
