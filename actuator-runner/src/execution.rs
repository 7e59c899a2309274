//! Single-shot job execution
//!
//! Drives one job through its lifecycle and turns the outcome into the
//! result handed back to the dispatcher. These types only exist for the
//! duration of one invocation; nothing is persisted.

use actuator_core::domain::job::{JobResult, JobState};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::context::JobContext;
use crate::error::{ErrorKind, JobError};
use crate::jobs::{JobRegistry, JobRunner};

/// Exit code for rejected input and unknown jobs
pub const EXIT_USAGE: i32 = 2;

/// Exit code for an external command that ran out of time
pub const EXIT_TIMEOUT: i32 = 124;

/// Outcome of one execution
#[derive(Debug)]
pub enum ExecutionResult {
    Success { output: Option<JsonValue> },
    Failure { error: JobError },
    UnknownJob { name: String },
}

impl ExecutionResult {
    /// Convert execution result to the result reported to the dispatcher
    pub fn into_job_result(self) -> JobResult {
        match self {
            ExecutionResult::Success { output } => JobResult::succeeded(output),
            ExecutionResult::Failure { error } => match &error {
                JobError::Validation(_) => JobResult::failed_with_code(EXIT_USAGE, error.to_string()),
                JobError::Timeout { .. } => {
                    JobResult::failed_with_code(EXIT_TIMEOUT, error.to_string())
                }
                _ => JobResult::failed(error.to_string()),
            },
            ExecutionResult::UnknownJob { name } => {
                JobResult::failed_with_code(EXIT_USAGE, format!("unknown job '{}'", name))
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecutionResult::Failure { error } if error.is_retryable())
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ExecutionResult::Failure { error } => Some(error.kind()),
            _ => None,
        }
    }
}

/// Everything the dispatcher learns about one invocation
#[derive(Debug, Serialize)]
pub struct JobReport {
    pub job: String,
    pub run_id: Uuid,
    pub state: JobState,
    /// Re-invocations the job declares useful
    pub retry_budget: u32,
    /// Whether re-invoking the job as is may succeed
    pub retryable: bool,
    pub error_kind: Option<ErrorKind>,
    pub result: JobResult,
}

/// Runs registered jobs against one context
pub struct JobExecutor {
    registry: JobRegistry,
    context: Arc<JobContext>,
}

impl JobExecutor {
    pub fn new(registry: JobRegistry, context: Arc<JobContext>) -> Self {
        Self { registry, context }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Creates job `name` without initializing it
    pub fn instantiate(&self, name: &str) -> Option<Box<dyn JobRunner>> {
        self.registry.create(name, self.context.clone())
    }

    /// Runs job `name` once: init, run, and rollback if the run failed
    pub async fn execute(&self, name: &str, payload: &str) -> JobReport {
        let run_id = self.context.run_id;

        let Some(mut job) = self.instantiate(name) else {
            error!("[{}] Unknown job '{}'", run_id, name);
            let outcome = ExecutionResult::UnknownJob {
                name: name.to_string(),
            };
            return self.report(name, JobState::Uninitialized, 0, outcome);
        };

        let retry_budget = job.retry();
        let mut state = JobState::Uninitialized;

        info!("[{}] Initializing job {}", run_id, job.name());
        let outcome = match drive(job.as_mut(), payload, &mut state).await {
            Ok(()) => {
                info!("[{}] Job {} succeeded", run_id, name);
                ExecutionResult::Success {
                    output: job.output(),
                }
            }
            Err(error) => {
                error!("[{}] Job {} failed in state {}: {}", run_id, name, state, error);

                if state == JobState::Failed {
                    if let Err(e) = job.rollback().await {
                        warn!("[{}] Rollback of {} failed: {}", run_id, name, e);
                    }
                }

                ExecutionResult::Failure { error }
            }
        };

        self.report(name, state, retry_budget, outcome)
    }

    fn report(
        &self,
        name: &str,
        state: JobState,
        retry_budget: u32,
        outcome: ExecutionResult,
    ) -> JobReport {
        let retryable = outcome.is_retryable();
        let error_kind = outcome.error_kind();
        JobReport {
            job: name.to_string(),
            run_id: self.context.run_id,
            state,
            retry_budget,
            retryable,
            error_kind,
            result: outcome.into_job_result(),
        }
    }
}

/// Walks `job` through init and run, tracking the lifecycle in `state`
async fn drive(
    job: &mut dyn JobRunner,
    payload: &str,
    state: &mut JobState,
) -> Result<(), JobError> {
    job.init(payload).await?;
    advance(state, JobState::Validated)?;
    advance(state, JobState::Running)?;

    match job.run().await {
        Ok(()) => advance(state, JobState::Succeeded),
        Err(e) => {
            advance(state, JobState::Failed)?;
            Err(e)
        }
    }
}

fn advance(state: &mut JobState, next: JobState) -> Result<(), JobError> {
    if !state.can_transition_to(next) {
        return Err(JobError::InvalidState(format!(
            "cannot move from {} to {}",
            state, next
        )));
    }
    *state = next;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::harness;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    static ROLLBACKS: AtomicUsize = AtomicUsize::new(0);

    struct FailingJob;

    #[async_trait]
    impl JobRunner for FailingJob {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn init(&mut self, _payload: &str) -> Result<(), JobError> {
            Ok(())
        }

        async fn run(&mut self) -> Result<(), JobError> {
            Err(JobError::Service("agent refused to stop".to_string()))
        }

        fn retry(&self) -> u32 {
            3
        }

        async fn rollback(&mut self) -> Result<(), JobError> {
            ROLLBACKS.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn example(&self) -> JsonValue {
            json!({})
        }
    }

    fn failing(_: Arc<JobContext>) -> Box<dyn JobRunner> {
        Box::new(FailingJob)
    }

    #[test]
    fn test_execution_result_success() {
        let result = ExecutionResult::Success {
            output: Some(json!({"updated": true})),
        };

        let job_result = result.into_job_result();
        assert!(job_result.success);
        assert_eq!(job_result.exit_code, 0);
        assert_eq!(job_result.output, Some(json!({"updated": true})));
    }

    #[test]
    fn test_execution_result_failure_codes() {
        let timeout = ExecutionResult::Failure {
            error: JobError::Timeout {
                command: "tar".to_string(),
                timeout: Duration::from_secs(60),
            },
        };
        assert_eq!(timeout.into_job_result().exit_code, EXIT_TIMEOUT);

        let service = ExecutionResult::Failure {
            error: JobError::Service("boom".to_string()),
        };
        let job_result = service.into_job_result();
        assert_eq!(job_result.exit_code, 1);
        assert!(job_result.error_message.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let tmp = TempDir::new().unwrap();
        let h = harness(tmp.path());
        let executor = JobExecutor::new(JobRegistry::with_defaults(), h.context);

        let report = executor.execute("no_such_job", "{}").await;
        assert_eq!(report.result.exit_code, EXIT_USAGE);
        assert_eq!(report.state, JobState::Uninitialized);
        assert!(!report.retryable);
    }

    #[tokio::test]
    async fn test_invalid_payload_stays_uninitialized() {
        let tmp = TempDir::new().unwrap();
        let h = harness(tmp.path());
        let executor = JobExecutor::new(JobRegistry::with_defaults(), h.context);

        let report = executor.execute("table_schema_check", "{\"host\": 1}").await;
        assert_eq!(report.state, JobState::Uninitialized);
        assert_eq!(report.result.exit_code, EXIT_USAGE);
        assert_eq!(report.error_kind, Some(ErrorKind::Validation));
        assert_eq!(report.retry_budget, 1);
    }

    #[tokio::test]
    async fn test_failed_run_rolls_back() {
        let tmp = TempDir::new().unwrap();
        let h = harness(tmp.path());
        let mut registry = JobRegistry::new();
        registry.register("failing", failing);
        let executor = JobExecutor::new(registry, h.context);

        let report = executor.execute("failing", "{}").await;

        assert_eq!(report.state, JobState::Failed);
        assert!(report.retryable);
        assert_eq!(report.retry_budget, 3);
        assert!(!report.result.success);
        assert_eq!(ROLLBACKS.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_successful_schema_check() {
        let tmp = TempDir::new().unwrap();
        let h = harness(tmp.path());
        let executor = JobExecutor::new(JobRegistry::with_defaults(), h.context);
        let payload = json!({
            "host": "127.0.0.1",
            "port": 26000,
            "check_objects": [{"dbname": "test", "tables": ["t1"]}]
        })
        .to_string();

        let report = executor.execute("table_schema_check", &payload).await;

        assert_eq!(report.state, JobState::Succeeded);
        assert!(report.result.success);
        assert_eq!(report.result.output.unwrap()["checked"], 1);
    }

    #[test]
    fn test_advance_rejects_skipping_states() {
        let mut state = JobState::Uninitialized;
        assert!(advance(&mut state, JobState::Running).is_err());
        assert_eq!(state, JobState::Uninitialized);
    }
}
