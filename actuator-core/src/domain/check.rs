//! Shard consistency check domain types

use serde::{Deserialize, Serialize};

/// Verdict of one schema checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Inconsistent,
}

impl CheckStatus {
    /// Value stored in the audit table
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Ok => "ok",
            CheckStatus::Inconsistent => "inconsistent",
        }
    }
}

/// One row reported by the coordinator's checksum command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDiscrepancy {
    pub server_name: String,
    pub db: String,
    pub tbl: String,
    pub status: String,
    pub message: String,
}

impl SchemaDiscrepancy {
    /// A row whose status is anything but `ok` marks a shard that disagrees
    pub fn is_inconsistent(&self) -> bool {
        !self.status.eq_ignore_ascii_case(CheckStatus::Ok.as_str())
    }
}

/// Persisted verdict for one (database, object) pair
///
/// The pair is the primary identity; a later check replaces the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardCheckRecord {
    pub database: String,
    pub object: String,
    pub status: CheckStatus,
    /// JSON array of discrepancies, empty when the object is consistent
    pub checksum_detail: String,
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

impl ShardCheckRecord {
    /// Classifies the checksum rows of one object into a record
    ///
    /// Rows reporting `ok` are dropped; anything left makes the object
    /// inconsistent and is serialized into the detail blob.
    pub fn classify(
        database: &str,
        object: &str,
        rows: &[SchemaDiscrepancy],
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Self, serde_json::Error> {
        let inconsistent: Vec<&SchemaDiscrepancy> =
            rows.iter().filter(|row| row.is_inconsistent()).collect();

        let (status, checksum_detail) = if inconsistent.is_empty() {
            (CheckStatus::Ok, String::new())
        } else {
            (
                CheckStatus::Inconsistent,
                serde_json::to_string(&inconsistent)?,
            )
        };

        Ok(Self {
            database: database.to_string(),
            object: object.to_string(),
            status,
            checksum_detail,
            last_updated: now,
        })
    }

    /// Primary key of the record
    pub fn key(&self) -> (&str, &str) {
        (&self.database, &self.object)
    }
}
