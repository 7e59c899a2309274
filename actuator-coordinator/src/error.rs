//! Error types for the coordinator connection

use thiserror::Error;

/// Result type alias for coordinator operations
pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Errors that can occur while talking to the coordinator
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Could not open the administrative connection
    #[error("Failed to connect to coordinator {addr}: {source}")]
    Connect {
        /// `host:port` of the coordinator
        addr: String,
        #[source]
        source: sqlx::Error,
    },

    /// A statement was rejected or the connection dropped mid-statement
    #[error("Coordinator statement failed ({statement}): {source}")]
    Query {
        /// The statement that failed
        statement: String,
        #[source]
        source: sqlx::Error,
    },

    /// A checksum result row did not have the expected shape
    #[error("Unexpected checksum row for {db}.{tbl}: {message}")]
    MalformedRow {
        db: String,
        tbl: String,
        message: String,
    },

    /// Discrepancy detail could not be encoded
    #[error("Failed to serialize check detail: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Coordinator refused or could not serve the request
    #[error("Coordinator unavailable: {0}")]
    Unavailable(String),
}

impl CoordinatorError {
    /// Create a query error for `statement`
    pub fn query(statement: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Query {
            statement: statement.into(),
            source,
        }
    }

    /// Check if re-running the job may succeed without operator action
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Query { .. } | Self::Unavailable(_)
        )
    }
}
