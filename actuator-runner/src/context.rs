//! Execution context for atomic jobs
//!
//! Carries the collaborators every job may need:
//! - Node configuration and path conventions
//! - Command runner for external tools
//! - Controller for the supervised agent process
//! - Coordinator client for schema checks

use actuator_coordinator::Coordinator;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::service::ServiceController;
use crate::shell::CommandRunner;

/// Collaborators shared by the jobs of one invocation
pub struct JobContext {
    /// Identifies this invocation in logs
    pub run_id: Uuid,

    pub config: Config,

    pub shell: Arc<dyn CommandRunner>,

    pub service: Arc<dyn ServiceController>,

    pub coordinator: Arc<dyn Coordinator>,
}

impl JobContext {
    /// Creates a context with a fresh run id
    pub fn new(
        config: Config,
        shell: Arc<dyn CommandRunner>,
        service: Arc<dyn ServiceController>,
        coordinator: Arc<dyn Coordinator>,
    ) -> Arc<Self> {
        Arc::new(Self {
            run_id: Uuid::new_v4(),
            config,
            shell,
            service,
            coordinator,
        })
    }
}
