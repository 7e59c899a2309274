//! `agent_install`: install, configure and (re)start the monitoring agent
//!
//! Steps, each gated on what the previous ones changed:
//! 1. No monitored targets: stop the agent and finish
//! 2. Install the declared package version behind the redirect pointer
//! 3. Reconcile the agent configuration file
//! 4. Stop the agent if the binary or its configuration changed
//! 5. Start the agent (no-op if already running)
//! 6. Reconcile one exporter metadata file per monitored port

use actuator_core::dto::decode_payload;
use actuator_core::dto::install::AgentInstallParams;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use tracing::info;

use super::JobRunner;
use super::agent_config::{AgentConfigDocument, ExporterMeta};
use crate::context::JobContext;
use crate::error::JobError;
use crate::service::{ConfigReconciler, VersionedArtifactInstaller};

/// What one run of `agent_install` did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    /// No targets were given, so the agent was only stopped
    pub stopped_only: bool,
    /// A new package was installed
    pub updated: bool,
    /// The configuration file was created or replaced
    pub config_changed: bool,
    /// The agent was stopped ahead of the start
    pub restarted: bool,
    /// Exporter files created or replaced
    pub exporter_files_changed: usize,
}

pub struct AgentInstallJob {
    ctx: Arc<JobContext>,
    params: Option<AgentInstallParams>,
    report: Option<InstallReport>,
}

impl AgentInstallJob {
    pub const NAME: &'static str = "agent_install";

    pub fn new(ctx: Arc<JobContext>) -> Self {
        Self {
            ctx,
            params: None,
            report: None,
        }
    }

    pub fn boxed(ctx: Arc<JobContext>) -> Box<dyn JobRunner> {
        Box::new(Self::new(ctx))
    }

    async fn execute(&self, params: &AgentInstallParams) -> Result<InstallReport, JobError> {
        let ctx = &self.ctx;
        let layout = &ctx.config.layout;
        let mut report = InstallReport::default();

        if params.targets_empty() {
            info!("No targets to monitor, stopping {}", layout.agent_name);
            ctx.service.stop().await?;
            report.stopped_only = true;
            return Ok(report);
        }

        let installer = VersionedArtifactInstaller::new(
            layout.clone(),
            ctx.shell.clone(),
            ctx.service.clone(),
            ctx.config.shell_timeout,
        );
        report.updated = installer.ensure(&params.agent_pkg).await?;

        let rendered = AgentConfigDocument::new(&ctx.config, params).render()?;
        report.config_changed = ConfigReconciler.reconcile(&layout.config_path(), &rendered)?;

        if report.updated || report.config_changed {
            ctx.service.stop().await?;
            report.restarted = true;
        } else {
            info!("{} binary and config both unchanged", layout.agent_name);
        }

        ctx.service.start().await?;

        for (ip, port, role) in params.targets() {
            let rendered = ExporterMeta::new(ip, port, role).render()?;
            if ConfigReconciler.reconcile(&layout.exporter_conf_path(port), &rendered)? {
                report.exporter_files_changed += 1;
            }
        }

        Ok(report)
    }
}

#[async_trait]
impl JobRunner for AgentInstallJob {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn init(&mut self, payload: &str) -> Result<(), JobError> {
        let params: AgentInstallParams = decode_payload(payload)?;
        info!(
            "{} params: pkg={}, {} target(s)",
            Self::NAME,
            params.agent_pkg.pkg,
            params.targets().count()
        );
        self.params = Some(params);
        Ok(())
    }

    async fn run(&mut self) -> Result<(), JobError> {
        let params = self
            .params
            .as_ref()
            .ok_or_else(|| JobError::InvalidState(format!("{} run before init", Self::NAME)))?;

        let report = self.execute(params).await?;
        info!("{} finished: {:?}", Self::NAME, report);
        self.report = Some(report);
        Ok(())
    }

    fn retry(&self) -> u32 {
        2
    }

    /// Every step is idempotent; re-running is the recovery
    async fn rollback(&mut self) -> Result<(), JobError> {
        Ok(())
    }

    fn example(&self) -> JsonValue {
        json!({
            "agent_pkg": {
                "pkg": format!("{}-v0.9.tar.gz", self.ctx.config.layout.agent_name),
                "pkg_md5": "a25bb3b4ee2bd28ad6d2d4bf0a4a0a3c"
            },
            "agent_address": "127.0.0.1:48000",
            "beat_path": "/usr/local/gse_bkte/plugins/bin/bkmonitorbeat",
            "backup_client_storage_type": "cos",
            "redis_fullbackup": {
                "to_backup_system": "yes",
                "old_file_left_day": 2,
                "cron": "0 5,13,21 * * *"
            },
            "redis_binlogbackup": {
                "to_backup_system": "yes",
                "old_file_left_day": 2,
                "cron": "@every 10m"
            },
            "redis_heartbeat": {"cron": "@every 10s"},
            "redis_monitor": {
                "bkmonitor_event_data_id": 542898,
                "bkmonitor_event_token": "xxxx",
                "bkmonitor_metric_data_id": 11111,
                "bkmonitor_metric_token": "xxxx",
                "cron": "@every 1m"
            },
            "redis_keylife": {"stat_dir": "/data/dbbak/keylifecycle", "cron": "0 3 * * *"},
            "servers": [{
                "bk_biz_id": "200500194",
                "bk_cloud_id": 246,
                "app": "testapp",
                "app_name": "testapp",
                "cluster_domain": "cache.test.testapp.db",
                "cluster_name": "test",
                "cluster_type": "PredixyTendisplusCluster",
                "meta_role": "redis_master",
                "server_ip": "127.0.0.1",
                "server_ports": [30000, 30001],
                "server_shards": {"127.0.0.1:30000": "0-4999", "127.0.0.1:30001": "5000-9999"},
                "cache_backup_mode": "aof",
                "shard": ""
            }]
        })
    }

    fn output(&self) -> Option<JsonValue> {
        self.report
            .as_ref()
            .and_then(|report| serde_json::to_value(report).ok())
    }
}
