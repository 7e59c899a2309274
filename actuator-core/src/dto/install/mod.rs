//! Agent install parameters

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Validate, ValidationError, require, require_ip};
use crate::domain::artifact::MediaPackage;

/// Free-form configuration section passed through to the agent
///
/// A `BTreeMap` keeps keys sorted so the rendered document is stable.
pub type ConfigSection = BTreeMap<String, serde_json::Value>;

/// One monitored server group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEntry {
    #[serde(default)]
    pub bk_biz_id: String,
    #[serde(default)]
    pub bk_cloud_id: i64,
    #[serde(default)]
    pub app: String,
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub cluster_domain: String,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub cluster_type: String,
    #[serde(default)]
    pub meta_role: String,
    #[serde(default)]
    pub server_ip: String,
    #[serde(default)]
    pub server_ports: Vec<u16>,
    #[serde(default)]
    pub server_shards: BTreeMap<String, String>,
    /// `aof` or `rdb`
    #[serde(default)]
    pub cache_backup_mode: String,
    #[serde(default)]
    pub shard: String,
}

impl ServerEntry {
    /// An entry without ports describes nothing to monitor
    pub fn has_targets(&self) -> bool {
        !self.server_ports.is_empty()
    }
}

impl Validate for ServerEntry {
    fn validate(&self) -> Result<(), ValidationError> {
        if !self.has_targets() {
            return Ok(());
        }

        require_ip("servers.server_ip", &self.server_ip)?;
        require("servers.cluster_name", &self.cluster_name)?;
        require("servers.cluster_domain", &self.cluster_domain)?;
        require("servers.cluster_type", &self.cluster_type)?;

        if self.server_ports.contains(&0) {
            return Err(ValidationError::PortOutOfRange {
                field: "servers.server_ports".to_string(),
                port: 0,
                min: 1,
                max: u16::MAX as u32,
            });
        }

        Ok(())
    }
}

/// Parameters of the `agent_install` job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInstallParams {
    pub agent_pkg: MediaPackage,
    pub agent_address: String,
    pub beat_path: String,
    #[serde(default)]
    pub backup_client_storage_type: String,
    pub redis_fullbackup: ConfigSection,
    pub redis_binlogbackup: ConfigSection,
    pub redis_heartbeat: ConfigSection,
    pub redis_monitor: ConfigSection,
    #[serde(default)]
    pub redis_keylife: ConfigSection,
    pub servers: Vec<ServerEntry>,
}

impl AgentInstallParams {
    /// True when no server entry carries a port
    ///
    /// An empty target set is a valid desired state: the agent is stopped.
    pub fn targets_empty(&self) -> bool {
        !self.servers.iter().any(ServerEntry::has_targets)
    }

    /// Every (ip, port, role) triple the agent will watch
    pub fn targets(&self) -> impl Iterator<Item = (&str, u16, &str)> {
        self.servers.iter().flat_map(|server| {
            server.server_ports.iter().map(move |port| {
                (
                    server.server_ip.as_str(),
                    *port,
                    server.meta_role.as_str(),
                )
            })
        })
    }
}

impl Validate for AgentInstallParams {
    fn validate(&self) -> Result<(), ValidationError> {
        require("agent_pkg.pkg", &self.agent_pkg.pkg)?;
        require("agent_address", &self.agent_address)?;
        require("beat_path", &self.beat_path)?;

        for server in &self.servers {
            server.validate()?;
        }

        Ok(())
    }
}
