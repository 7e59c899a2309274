//! Actuator Coordinator Client
//!
//! Administrative connection to a cluster coordinator node (the routing /
//! control node that knows every shard). The coordinator fans a checksum
//! of one table out to all shard members and reports which members
//! disagree; verdicts are persisted back on the coordinator in an audit
//! table keyed by (database, table).
//!
//! # Example
//!
//! ```no_run
//! use actuator_coordinator::{Coordinator, CoordinatorTarget, TdbctlCoordinator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let target = CoordinatorTarget::new("127.0.0.1", 26000, "admin", "secret");
//!     let mut session = TdbctlCoordinator.connect(&target).await?;
//!
//!     session.ensure_audit_table().await?;
//!     let rows = session.checksum("test", "t1").await?;
//!     println!("{} shard rows", rows.len());
//!     Ok(())
//! }
//! ```

pub mod error;
#[cfg(any(test, feature = "test-support"))]
mod memory;
mod tdbctl;

// Re-export commonly used types
pub use error::{CoordinatorError, Result};
#[cfg(any(test, feature = "test-support"))]
pub use memory::InMemoryCoordinator;
pub use tdbctl::{TdbctlCoordinator, TdbctlSession};

use actuator_core::domain::check::{SchemaDiscrepancy, ShardCheckRecord};
use async_trait::async_trait;

/// Where and as whom to connect
#[derive(Clone)]
pub struct CoordinatorTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl CoordinatorTarget {
    /// Create a new target description
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
        }
    }

    /// `host:port`, used in logs and errors
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Debug for CoordinatorTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Opens administrative sessions to a coordinator
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Opens one session; callers keep it for the whole job
    async fn connect(&self, target: &CoordinatorTarget) -> Result<Box<dyn CoordinatorSession>>;
}

/// One open administrative session
#[async_trait]
pub trait CoordinatorSession: Send {
    /// Creates the audit table if it does not exist yet
    async fn ensure_audit_table(&mut self) -> Result<()>;

    /// Asks the coordinator to checksum `db`.`tbl` across all shards
    ///
    /// Returns every row reported by the coordinator, consistent or not.
    async fn checksum(&mut self, db: &str, tbl: &str) -> Result<Vec<SchemaDiscrepancy>>;

    /// Writes `record`, replacing any previous row for the same key
    async fn replace_record(&mut self, record: &ShardCheckRecord) -> Result<()>;
}
