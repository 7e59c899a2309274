//! Tdbctl coordinator session
//!
//! Speaks the MySQL protocol to the coordinator. Checksum requests are
//! coordinator commands that only run in admin mode (`tc_admin=1`);
//! ordinary SQL against the audit table needs admin mode off. The session
//! flips the mode before every statement instead of remembering it, since
//! the server side is the only reliable record of the current mode.

use actuator_core::domain::check::{SchemaDiscrepancy, ShardCheckRecord};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{CoordinatorError, Result};
use crate::{Coordinator, CoordinatorSession, CoordinatorTarget};

pub(crate) const CREATE_AUDIT_SCHEMA: &str = "CREATE DATABASE IF NOT EXISTS infodba_schema";

pub(crate) const CREATE_AUDIT_TABLE: &str = r#"CREATE TABLE IF NOT EXISTS infodba_schema.tscc_schema_checksum (
    db CHAR(64) NOT NULL,
    tbl CHAR(64) NOT NULL,
    status CHAR(32) NOT NULL DEFAULT '' COMMENT 'ok or inconsistent',
    checksum_result JSON COMMENT 'checksum rows of the shards that disagree',
    update_time TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
    PRIMARY KEY (db, tbl)
)"#;

pub(crate) const REPLACE_RECORD: &str = r#"REPLACE INTO infodba_schema.tscc_schema_checksum
    (db, tbl, status, checksum_result, update_time)
    VALUES (?, ?, ?, ?, ?)"#;

const ADMIN_ON: &str = "set tc_admin=1";
const ADMIN_OFF: &str = "set tc_admin=0";

/// Column count of a `tdbctl checksum` result row
const CHECKSUM_COLUMNS: usize = 5;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connects to a tdbctl coordinator over the MySQL protocol
#[derive(Debug, Clone, Copy, Default)]
pub struct TdbctlCoordinator;

#[async_trait]
impl Coordinator for TdbctlCoordinator {
    async fn connect(&self, target: &CoordinatorTarget) -> Result<Box<dyn CoordinatorSession>> {
        let session = TdbctlSession::connect(target).await?;
        Ok(Box::new(session))
    }
}

/// An open administrative session on the coordinator
///
/// Backed by a pool capped at one connection, so every statement of the
/// job runs on the same server session.
pub struct TdbctlSession {
    pool: MySqlPool,
    addr: String,
}

impl TdbctlSession {
    /// Opens the session's single connection to `target`
    pub async fn connect(target: &CoordinatorTarget) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&target.host)
            .port(target.port)
            .username(&target.user)
            .password(&target.password);

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|source| CoordinatorError::Connect {
                addr: target.addr(),
                source,
            })?;

        info!("Connected to coordinator {}", target.addr());

        Ok(Self {
            pool,
            addr: target.addr(),
        })
    }

    async fn set_admin_mode(&self, enabled: bool) -> Result<()> {
        let statement = if enabled { ADMIN_ON } else { ADMIN_OFF };
        self.run_raw(statement).await
    }

    async fn run_raw(&self, statement: &'static str) -> Result<()> {
        sqlx::raw_sql(statement)
            .execute(&self.pool)
            .await
            .map_err(|e| CoordinatorError::query(statement, e))?;
        Ok(())
    }
}

#[async_trait]
impl CoordinatorSession for TdbctlSession {
    async fn ensure_audit_table(&mut self) -> Result<()> {
        self.set_admin_mode(false).await?;
        self.run_raw(CREATE_AUDIT_SCHEMA).await?;
        self.run_raw(CREATE_AUDIT_TABLE).await?;
        debug!("Audit table present on {}", self.addr);
        Ok(())
    }

    async fn checksum(&mut self, db: &str, tbl: &str) -> Result<Vec<SchemaDiscrepancy>> {
        self.set_admin_mode(true).await?;

        let statement = checksum_statement(db, tbl);
        debug!("{}", statement);

        let rows = sqlx::raw_sql(&statement)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoordinatorError::query(statement.as_str(), e))?;

        rows.iter()
            .map(|row| {
                let columns = row_columns(db, tbl, row)?;
                discrepancy_from_columns(db, tbl, columns)
            })
            .collect()
    }

    async fn replace_record(&mut self, record: &ShardCheckRecord) -> Result<()> {
        self.set_admin_mode(false).await?;

        let (db, tbl) = record.key();
        let detail: Option<String> =
            (!record.checksum_detail.is_empty()).then(|| record.checksum_detail.clone());

        sqlx::query(REPLACE_RECORD)
            .bind(db.to_string())
            .bind(tbl.to_string())
            .bind(record.status.as_str().to_string())
            .bind(detail)
            .bind(record.last_updated)
            .execute(&self.pool)
            .await
            .map_err(|e| CoordinatorError::query(REPLACE_RECORD, e))?;

        info!(
            "Stored check result {}.{} = {}",
            db,
            tbl,
            record.status.as_str()
        );
        Ok(())
    }
}

/// Builds the coordinator checksum command for one table
pub(crate) fn checksum_statement(db: &str, tbl: &str) -> String {
    format!("tdbctl checksum {}.{}", quote_ident(db), quote_ident(tbl))
}

fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

fn malformed(db: &str, tbl: &str, message: String) -> CoordinatorError {
    CoordinatorError::MalformedRow {
        db: db.to_string(),
        tbl: tbl.to_string(),
        message,
    }
}

/// Reads every column of a checksum row as text; NULL stays `None`
fn row_columns(db: &str, tbl: &str, row: &MySqlRow) -> Result<Vec<Option<String>>> {
    (0..row.len())
        .map(|idx| {
            row.try_get::<Option<String>, _>(idx)
                .map_err(|e| malformed(db, tbl, e.to_string()))
        })
        .collect()
}

/// Maps the positional columns `server_name, db, tbl, status, message`
fn discrepancy_from_columns(
    db: &str,
    tbl: &str,
    columns: Vec<Option<String>>,
) -> Result<SchemaDiscrepancy> {
    if columns.len() < CHECKSUM_COLUMNS {
        return Err(malformed(
            db,
            tbl,
            format!("expected {} columns, got {}", CHECKSUM_COLUMNS, columns.len()),
        ));
    }

    let mut values = columns.into_iter().map(Option::unwrap_or_default);
    let mut next = || values.next().unwrap_or_default();

    Ok(SchemaDiscrepancy {
        server_name: next(),
        db: next(),
        tbl: next(),
        status: next(),
        message: next(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_statement_quotes_names() {
        assert_eq!(checksum_statement("test", "t1"), "tdbctl checksum `test`.`t1`");
        assert_eq!(
            checksum_statement("we`ird", "t1"),
            "tdbctl checksum `we``ird`.`t1`"
        );
    }

    #[test]
    fn test_audit_table_keyed_by_db_and_table() {
        assert!(CREATE_AUDIT_TABLE.contains("PRIMARY KEY (db, tbl)"));
        assert!(CREATE_AUDIT_TABLE.contains("IF NOT EXISTS"));
    }

    #[test]
    fn test_record_write_replaces() {
        assert!(REPLACE_RECORD.trim_start().starts_with("REPLACE INTO"));
        assert_eq!(REPLACE_RECORD.matches('?').count(), 5);
    }

    fn columns(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|v| v.map(str::to_string)).collect()
    }

    #[test]
    fn test_checksum_row_maps_by_position() {
        let row = columns(&[
            Some("SPT1"),
            Some("test"),
            Some("t1"),
            Some("inconsistent"),
            Some("column c1 differs"),
        ]);

        let discrepancy = discrepancy_from_columns("test", "t1", row).unwrap();
        assert_eq!(discrepancy.server_name, "SPT1");
        assert_eq!(discrepancy.db, "test");
        assert_eq!(discrepancy.tbl, "t1");
        assert_eq!(discrepancy.status, "inconsistent");
        assert_eq!(discrepancy.message, "column c1 differs");
    }

    #[test]
    fn test_checksum_row_null_columns_read_empty() {
        let row = columns(&[Some("SPT1"), Some("test"), Some("t1"), Some("ok"), None]);

        let discrepancy = discrepancy_from_columns("test", "t1", row).unwrap();
        assert_eq!(discrepancy.status, "ok");
        assert!(discrepancy.message.is_empty());
    }

    #[test]
    fn test_short_checksum_row_is_malformed() {
        let row = columns(&[Some("SPT1"), Some("test"), Some("t1")]);

        let err = discrepancy_from_columns("test", "t1", row).unwrap_err();
        assert!(matches!(err, CoordinatorError::MalformedRow { .. }));
        assert!(!err.is_transient());
        assert!(err.to_string().contains("got 3"));
    }
}
