//! Job domain types

use serde::{Deserialize, Serialize};

/// Lifecycle state of a single job instance
///
/// `Uninitialized -> Validated -> Running -> {Succeeded, Failed}`.
/// A failed `Init` keeps the job in `Uninitialized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Uninitialized,
    Validated,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    /// Returns true if moving from `self` to `next` is a legal transition
    pub fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Uninitialized, JobState::Validated)
                | (JobState::Validated, JobState::Running)
                | (JobState::Running, JobState::Succeeded)
                | (JobState::Running, JobState::Failed)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Uninitialized => "uninitialized",
            JobState::Validated => "validated",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Result of a job execution
///
/// This is what the external dispatcher receives back for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub success: bool,
    pub exit_code: i32,
    pub output: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

impl JobResult {
    /// Successful result with optional structured output
    pub fn succeeded(output: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            exit_code: 0,
            output,
            error_message: None,
        }
    }

    /// Failed result with exit code 1
    pub fn failed(message: impl Into<String>) -> Self {
        Self::failed_with_code(1, message)
    }

    /// Failed result with an explicit exit code
    pub fn failed_with_code(exit_code: i32, message: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code,
            output: None,
            error_message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        assert!(JobState::Uninitialized.can_transition_to(JobState::Validated));
        assert!(JobState::Validated.can_transition_to(JobState::Running));
        assert!(JobState::Running.can_transition_to(JobState::Succeeded));
        assert!(JobState::Running.can_transition_to(JobState::Failed));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!JobState::Uninitialized.can_transition_to(JobState::Running));
        assert!(!JobState::Validated.can_transition_to(JobState::Succeeded));
        assert!(!JobState::Succeeded.can_transition_to(JobState::Running));
        assert!(!JobState::Failed.can_transition_to(JobState::Validated));
    }

    #[test]
    fn test_job_result_constructors() {
        let ok = JobResult::succeeded(Some(serde_json::json!({"updated": true})));
        assert!(ok.success);
        assert_eq!(ok.exit_code, 0);
        assert!(ok.error_message.is_none());

        let failed = JobResult::failed_with_code(2, "unknown job");
        assert!(!failed.success);
        assert_eq!(failed.exit_code, 2);
        assert_eq!(failed.error_message.as_deref(), Some("unknown job"));

        let failed = JobResult::failed("agent refused to stop");
        assert_eq!(failed.exit_code, 1);
    }
}
