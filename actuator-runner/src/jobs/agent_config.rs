//! Documents rendered for the monitoring agent
//!
//! Rendering must be byte-stable for identical inputs: fields serialize in
//! declaration order and every free-form map is a `BTreeMap`.

use actuator_core::dto::install::{AgentInstallParams, ConfigSection, ServerEntry};
use serde::Serialize;

use crate::config::Config;
use crate::error::JobError;

/// The agent's YAML configuration file
#[derive(Debug, Serialize)]
pub struct AgentConfigDocument<'a> {
    pub report_save_dir: &'a str,
    pub report_left_day: u32,
    pub http_address: &'a str,
    pub agent_address: &'a str,
    pub beat_path: &'a str,
    pub backup_client_storage_type: &'a str,
    pub redis_fullbackup: &'a ConfigSection,
    pub redis_binlogbackup: &'a ConfigSection,
    pub redis_heartbeat: &'a ConfigSection,
    pub redis_monitor: &'a ConfigSection,
    pub redis_keylife: &'a ConfigSection,
    pub servers: &'a [ServerEntry],
}

impl<'a> AgentConfigDocument<'a> {
    /// Merges job parameters with the node's static defaults
    pub fn new(config: &'a Config, params: &'a AgentInstallParams) -> Self {
        Self {
            report_save_dir: &config.report_dir,
            report_left_day: config.report_left_day,
            http_address: &config.agent_http_address,
            agent_address: &params.agent_address,
            beat_path: &params.beat_path,
            backup_client_storage_type: &params.backup_client_storage_type,
            redis_fullbackup: &params.redis_fullbackup,
            redis_binlogbackup: &params.redis_binlogbackup,
            redis_heartbeat: &params.redis_heartbeat,
            redis_monitor: &params.redis_monitor,
            redis_keylife: &params.redis_keylife,
            servers: &params.servers,
        }
    }

    pub fn render(&self) -> Result<Vec<u8>, JobError> {
        serde_yaml::to_string(self)
            .map(String::into_bytes)
            .map_err(|e| JobError::Render {
                what: "agent config",
                message: e.to_string(),
            })
    }
}

/// Exporter metadata for one monitored instance
#[derive(Debug, Serialize)]
pub struct ExporterMeta<'a> {
    pub addr: String,
    pub meta_role: &'a str,
}

impl<'a> ExporterMeta<'a> {
    pub fn new(ip: &str, port: u16, meta_role: &'a str) -> Self {
        Self {
            addr: format!("{}:{}", ip, port),
            meta_role,
        }
    }

    pub fn render(&self) -> Result<Vec<u8>, JobError> {
        serde_json::to_vec(self).map_err(|e| JobError::Render {
            what: "exporter config",
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::reconciler::content_hash;
    use actuator_core::dto::decode_payload;

    fn params() -> AgentInstallParams {
        decode_payload(
            &serde_json::json!({
                "agent_pkg": {"pkg": "bk-dbmon-v0.9.tar.gz"},
                "agent_address": "127.0.0.1:48000",
                "beat_path": "/usr/local/gse_bkte/plugins/bin/bkmonitorbeat",
                "redis_fullbackup": {"to_backup_system": "yes", "old_file_left_day": 2},
                "redis_binlogbackup": {"to_backup_system": "yes", "cron": "@every 10m"},
                "redis_heartbeat": {"cron": "@every 10s"},
                "redis_monitor": {"bkmonitor_event_data_id": 542898, "cron": "@every 1m"},
                "servers": [{
                    "bk_biz_id": "200500194",
                    "cluster_domain": "cache.test.testapp.db",
                    "cluster_name": "test",
                    "cluster_type": "PredixyTendisplusCluster",
                    "meta_role": "redis_master",
                    "server_ip": "127.0.0.1",
                    "server_ports": [30000]
                }]
            })
            .to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_render_is_deterministic() {
        let config = Config::default();
        let params = params();

        let first = AgentConfigDocument::new(&config, &params).render().unwrap();
        let second = AgentConfigDocument::new(&config, &params).render().unwrap();

        assert_eq!(content_hash(&first), content_hash(&second));
    }

    #[test]
    fn test_single_field_change_changes_hash() {
        let config = Config::default();
        let params = params();
        let mut changed = params.clone();
        changed.beat_path = "/usr/local/bin/beat".to_string();

        let a = AgentConfigDocument::new(&config, &params).render().unwrap();
        let b = AgentConfigDocument::new(&config, &changed).render().unwrap();

        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_render_field_order() {
        let config = Config::default();
        let params = params();
        let yaml = String::from_utf8(AgentConfigDocument::new(&config, &params).render().unwrap())
            .unwrap();

        assert!(yaml.starts_with("report_save_dir: /home/mysql/dbareport/\n"));
        let monitor = yaml.find("redis_monitor:").unwrap();
        let servers = yaml.find("servers:").unwrap();
        assert!(monitor < servers);

        let start = yaml.find("redis_binlogbackup:").unwrap();
        let end = yaml.find("redis_heartbeat:").unwrap();
        let binlog = &yaml[start..end];
        assert!(binlog.find("cron:").unwrap() < binlog.find("to_backup_system:").unwrap());
    }

    #[test]
    fn test_exporter_meta() {
        let rendered = ExporterMeta::new("127.0.0.1", 30000, "redis_master")
            .render()
            .unwrap();
        assert_eq!(
            rendered,
            br#"{"addr":"127.0.0.1:30000","meta_role":"redis_master"}"#
        );
    }
}
