//! Job registry
//!
//! Maps a job name to a constructor. The dispatcher holds no job-specific
//! logic; adding a job means registering one more factory.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{AgentInstallJob, JobRunner, SchemaCheckJob};
use crate::context::JobContext;

/// Builds a fresh, uninitialized job
pub type JobFactory = fn(Arc<JobContext>) -> Box<dyn JobRunner>;

#[derive(Clone)]
pub struct JobRegistry {
    factories: BTreeMap<&'static str, JobFactory>,
}

impl JobRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Creates a registry with every built-in job
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(AgentInstallJob::NAME, AgentInstallJob::boxed);
        registry.register(SchemaCheckJob::NAME, SchemaCheckJob::boxed);
        registry
    }

    /// Registers `factory` under `name`, replacing any previous entry
    pub fn register(&mut self, name: &'static str, factory: JobFactory) {
        self.factories.insert(name, factory);
    }

    /// Instantiates the job registered as `name`
    pub fn create(&self, name: &str, ctx: Arc<JobContext>) -> Option<Box<dyn JobRunner>> {
        self.factories.get(name).map(|factory| factory(ctx))
    }

    /// Registered names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
