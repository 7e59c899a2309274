//! `table_schema_check`: audit table schema consistency across shards
//!
//! One coordinator session is opened in `init` and reused for every
//! object. Each (database, table) pair is checksummed, classified and
//! written to the audit table with replace semantics. The first failing
//! checksum aborts the job; the operator re-runs it once the cause is fixed.

use actuator_coordinator::{CoordinatorSession, CoordinatorTarget};
use actuator_core::domain::check::{CheckStatus, ShardCheckRecord};
use actuator_core::dto::schema_check::SchemaCheckParams;
use actuator_core::dto::{ValidationError, decode_payload};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use tracing::{info, warn};

use super::JobRunner;
use crate::context::JobContext;
use crate::error::JobError;

/// Verdict counts of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaCheckReport {
    pub checked: usize,
    pub inconsistent: Vec<String>,
}

pub struct SchemaCheckJob {
    ctx: Arc<JobContext>,
    params: Option<SchemaCheckParams>,
    session: Option<Box<dyn CoordinatorSession>>,
    report: Option<SchemaCheckReport>,
}

impl SchemaCheckJob {
    pub const NAME: &'static str = "table_schema_check";

    pub fn new(ctx: Arc<JobContext>) -> Self {
        Self {
            ctx,
            params: None,
            session: None,
            report: None,
        }
    }

    pub fn boxed(ctx: Arc<JobContext>) -> Box<dyn JobRunner> {
        Box::new(Self::new(ctx))
    }
}

#[async_trait]
impl JobRunner for SchemaCheckJob {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn init(&mut self, payload: &str) -> Result<(), JobError> {
        let params: SchemaCheckParams = decode_payload(payload)?;
        let port = u16::try_from(params.port).map_err(|_| ValidationError::PortOutOfRange {
            field: "port".to_string(),
            port: params.port,
            min: 1,
            max: u16::MAX as u32,
        })?;

        let target = CoordinatorTarget::new(
            params.host.trim(),
            port,
            self.ctx.config.admin_user.clone(),
            self.ctx.config.admin_password.clone(),
        );

        info!("Connecting to coordinator {}", target.addr());
        let mut session = self.ctx.coordinator.connect(&target).await?;
        session.ensure_audit_table().await?;

        self.params = Some(params);
        self.session = Some(session);
        Ok(())
    }

    async fn run(&mut self) -> Result<(), JobError> {
        let (Some(params), Some(session)) = (self.params.as_ref(), self.session.as_mut()) else {
            return Err(JobError::InvalidState(format!(
                "{} run before init",
                Self::NAME
            )));
        };

        let mut report = SchemaCheckReport::default();

        for (db, tbl) in params.pairs() {
            info!("Checking schema of {}.{}", db, tbl);
            let rows = session.checksum(db, tbl).await?;

            let record = ShardCheckRecord::classify(db, tbl, &rows, chrono::Utc::now())
                .map_err(actuator_coordinator::CoordinatorError::from)?;

            if record.status == CheckStatus::Inconsistent {
                warn!("{}.{} is inconsistent: {}", db, tbl, record.checksum_detail);
                report.inconsistent.push(format!("{}.{}", db, tbl));
            }

            session.replace_record(&record).await?;
            report.checked += 1;
        }

        info!(
            "{} finished: {} checked, {} inconsistent",
            Self::NAME,
            report.checked,
            report.inconsistent.len()
        );
        self.report = Some(report);
        Ok(())
    }

    fn retry(&self) -> u32 {
        1
    }

    /// Verdict rows are replaced on the next run; nothing to undo
    async fn rollback(&mut self) -> Result<(), JobError> {
        Ok(())
    }

    fn example(&self) -> JsonValue {
        json!({
            "host": "1.1.1.1",
            "port": 26000,
            "check_objects": [
                {"dbname": "test", "tables": ["t1", "t2"]},
                {"dbname": "db1", "tables": ["orders"]}
            ]
        })
    }

    fn output(&self) -> Option<JsonValue> {
        self.report
            .as_ref()
            .and_then(|report| serde_json::to_value(report).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::harness;
    use actuator_core::domain::check::SchemaDiscrepancy;
    use tempfile::TempDir;

    fn discrepancy(tbl: &str) -> SchemaDiscrepancy {
        SchemaDiscrepancy {
            server_name: "SPT1".to_string(),
            db: "test".to_string(),
            tbl: tbl.to_string(),
            status: "inconsistent".to_string(),
            message: "column c1 differs".to_string(),
        }
    }

    fn payload(tables: &[&str]) -> String {
        json!({
            "host": "127.0.0.1",
            "port": 26000,
            "check_objects": [{"dbname": "test", "tables": tables}]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_verdict_is_replaced_not_appended() {
        let tmp = TempDir::new().unwrap();
        let h = harness(tmp.path());
        h.coordinator.set_rows("test", "t1", vec![discrepancy("t1")]);

        let mut job = SchemaCheckJob::new(h.context.clone());
        job.init(&payload(&["t1"])).await.unwrap();
        job.run().await.unwrap();

        let record = h.coordinator.record("test", "t1").unwrap();
        assert_eq!(record.status, CheckStatus::Inconsistent);
        assert!(!record.checksum_detail.is_empty());
        assert_eq!(job.report.as_ref().unwrap().inconsistent, vec!["test.t1"]);

        h.coordinator.set_rows("test", "t1", vec![]);
        let mut job = SchemaCheckJob::new(h.context.clone());
        job.init(&payload(&["t1"])).await.unwrap();
        job.run().await.unwrap();

        let records = h.coordinator.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, CheckStatus::Ok);
        assert!(records[0].checksum_detail.is_empty());
    }

    #[tokio::test]
    async fn test_one_connection_per_job() {
        let tmp = TempDir::new().unwrap();
        let h = harness(tmp.path());

        let mut job = SchemaCheckJob::new(h.context.clone());
        job.init(&payload(&["t1", "t2", "t3"])).await.unwrap();
        job.run().await.unwrap();

        assert_eq!(h.coordinator.connections(), 1);
        assert!(h.coordinator.audit_table_created());
        assert_eq!(h.coordinator.records().len(), 3);
        assert_eq!(job.report.as_ref().unwrap().checked, 3);
    }

    #[tokio::test]
    async fn test_failing_object_aborts_remaining() {
        let tmp = TempDir::new().unwrap();
        let h = harness(tmp.path());
        h.coordinator.fail_checksum("test", "t2");

        let mut job = SchemaCheckJob::new(h.context.clone());
        job.init(&payload(&["t1", "t2", "t3"])).await.unwrap();
        let err = job.run().await.unwrap_err();

        assert!(matches!(err, JobError::Coordinator(_)));
        assert!(err.is_retryable());
        let checked: Vec<_> = h.coordinator.checked().into_iter().map(|(_, t)| t).collect();
        assert_eq!(checked, vec!["t1", "t2"]);
        assert!(h.coordinator.record("test", "t1").is_some());
        assert!(h.coordinator.record("test", "t3").is_none());
    }

    #[tokio::test]
    async fn test_invalid_host_never_connects() {
        let tmp = TempDir::new().unwrap();
        let h = harness(tmp.path());

        let mut job = SchemaCheckJob::new(h.context.clone());
        let raw = json!({
            "host": "not-an-ip",
            "port": 26000,
            "check_objects": [{"dbname": "test", "tables": ["t1"]}]
        })
        .to_string();

        let err = job.init(&raw).await.unwrap_err();
        assert!(matches!(err, JobError::Validation(_)));
        assert_eq!(h.coordinator.connections(), 0);
    }

    #[tokio::test]
    async fn test_refused_connection_fails_init() {
        let tmp = TempDir::new().unwrap();
        let h = harness(tmp.path());
        h.coordinator.refuse_connections();

        let mut job = SchemaCheckJob::new(h.context.clone());
        let err = job.init(&payload(&["t1"])).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_example_is_a_valid_payload() {
        let tmp = TempDir::new().unwrap();
        let h = harness(tmp.path());
        let mut job = SchemaCheckJob::new(h.context.clone());

        let example = job.example().to_string();
        job.init(&example).await.unwrap();
        assert_eq!(job.retry(), 1);
    }
}
