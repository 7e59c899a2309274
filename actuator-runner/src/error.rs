//! Job error taxonomy
//!
//! Every step returns the first error it hits. The variants group into
//! validation, precondition, transient and fatal failures; only transient
//! failures are worth a blind retry by the dispatcher.

use actuator_coordinator::CoordinatorError;
use actuator_core::domain::artifact::ArtifactNameError;
use actuator_core::dto::ValidationError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Coarse classification reported back to the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Precondition,
    Transient,
    Fatal,
}

/// Errors raised by jobs and the components they compose
#[derive(Debug, Error)]
pub enum JobError {
    /// Parameters rejected before any side effect
    #[error("invalid parameters: {0}")]
    Validation(#[from] ValidationError),

    /// Package name carries no recognizable version
    #[error(transparent)]
    MalformedArtifactName(#[from] ArtifactNameError),

    /// Package file is not where the parameters say it is
    #[error("package {} does not exist", .path.display())]
    PackageMissing { path: PathBuf },

    /// Extraction finished but did not produce the expected directory
    #[error("extracted {} but {} does not exist", .package.display(), .expected.display())]
    ExtractionIncomplete { package: PathBuf, expected: PathBuf },

    /// External command could not be spawned or exited non-zero
    #[error("command `{command}` failed: {message}")]
    Command { command: String, message: String },

    /// External command exceeded its wall-clock bound
    #[error("command `{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// Filesystem operation failed
    #[error("{op} {} failed: {source}", .path.display())]
    Filesystem {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Coordinator connection or statement failed
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    /// Supervised process could not be stopped or started
    #[error("service control failed: {0}")]
    Service(String),

    /// Target document could not be serialized
    #[error("failed to render {what}: {message}")]
    Render { what: &'static str, message: String },

    /// Lifecycle method called out of order
    #[error("invalid job state: {0}")]
    InvalidState(String),
}

impl JobError {
    /// Wraps an I/O error with the operation and path involved
    pub fn fs(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Filesystem {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Classifies the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::Validation(_) => ErrorKind::Validation,
            JobError::MalformedArtifactName(_)
            | JobError::PackageMissing { .. }
            | JobError::ExtractionIncomplete { .. } => ErrorKind::Precondition,
            JobError::Command { .. } | JobError::Timeout { .. } | JobError::Service(_) => {
                ErrorKind::Transient
            }
            JobError::Coordinator(e) if e.is_transient() => ErrorKind::Transient,
            JobError::Coordinator(_)
            | JobError::Filesystem { .. }
            | JobError::Render { .. }
            | JobError::InvalidState(_) => ErrorKind::Fatal,
        }
    }

    /// Check if the dispatcher may usefully re-run the job as is
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
