//! Actuator configuration
//!
//! Defines the node-local path conventions shared with the managed agent,
//! the static defaults merged into its configuration document, command
//! timeouts and the coordinator credentials.

use anyhow::Context;
#[cfg(test)]
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// File name of the agent configuration inside the installation directory
pub const AGENT_CONFIG_FILE: &str = "dbmon-config.yaml";

/// Node-local filesystem conventions
///
/// These locations are the whole contract with the managed agent. They are
/// carried as a value so tests can point every component at a scratch dir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLayout {
    /// Directory holding the redirect pointer (e.g. "/home/mysql")
    pub install_root: PathBuf,

    /// Agent name; names the pointer, the binary and the package prefix
    pub agent_name: String,

    /// Where delivered packages are found
    pub package_dir: PathBuf,

    /// Parent of the versioned installation directories
    pub extract_dir: PathBuf,

    /// Per-target exporter metadata files
    pub exporter_conf_dir: PathBuf,
}

impl PathLayout {
    /// The redirect pointer, `<root>/<agent>`
    pub fn link_path(&self) -> PathBuf {
        self.install_root.join(&self.agent_name)
    }

    /// Agent binary, resolved through the pointer
    pub fn binary_path(&self) -> PathBuf {
        self.link_path().join(&self.agent_name)
    }

    /// Agent configuration file, resolved through the pointer
    pub fn config_path(&self) -> PathBuf {
        self.link_path().join(AGENT_CONFIG_FILE)
    }

    /// Pid file of the running agent
    pub fn pid_path(&self) -> PathBuf {
        self.link_path().join(format!("{}.pid", self.agent_name))
    }

    /// Output log of the running agent
    pub fn log_path(&self) -> PathBuf {
        self.link_path().join(format!("{}.log", self.agent_name))
    }

    /// Directory a package named `dir_name` extracts into
    pub fn versioned_dir(&self, dir_name: &str) -> PathBuf {
        self.extract_dir.join(dir_name)
    }

    /// Exporter metadata file for one monitored port
    pub fn exporter_conf_path(&self, port: u16) -> PathBuf {
        self.exporter_conf_dir.join(format!("{}.conf", port))
    }

    /// Layout with every location below `root`
    #[cfg(test)]
    pub fn under(root: &Path, agent_name: &str) -> Self {
        Self {
            install_root: root.join("home"),
            agent_name: agent_name.to_string(),
            package_dir: root.join("install"),
            extract_dir: root.join("dbbak"),
            exporter_conf_dir: root.join("exporter"),
        }
    }
}

impl Default for PathLayout {
    fn default() -> Self {
        Self {
            install_root: PathBuf::from("/home/mysql"),
            agent_name: "bk-dbmon".to_string(),
            package_dir: PathBuf::from("/data/install"),
            extract_dir: PathBuf::from("/data/dbbak"),
            exporter_conf_dir: PathBuf::from("/home/mysql/.exporter"),
        }
    }
}

/// Actuator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Filesystem conventions
    pub layout: PathLayout,

    /// Directory the agent writes its reports into
    pub report_dir: String,

    /// Days of reports the agent keeps
    pub report_left_day: u32,

    /// Address the agent serves its local HTTP API on
    pub agent_http_address: String,

    /// Wall-clock bound for each external command
    pub shell_timeout: Duration,

    /// Grace period before a stop escalates to SIGKILL
    pub stop_timeout: Duration,

    /// Coordinator admin account
    pub admin_user: String,

    /// Coordinator admin password
    pub admin_password: String,
}

impl Config {
    /// Creates a configuration with defaults around `layout`
    pub fn new(layout: PathLayout) -> Self {
        Self {
            layout,
            report_dir: "/home/mysql/dbareport/".to_string(),
            report_left_day: 15,
            agent_http_address: "127.0.0.1:6677".to_string(),
            shell_timeout: Duration::from_secs(60),
            stop_timeout: Duration::from_secs(10),
            admin_user: String::new(),
            admin_password: String::new(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Every variable is optional; a set but unparsable value is an error:
    /// - ACTUATOR_INSTALL_ROOT (default: /home/mysql)
    /// - ACTUATOR_AGENT_NAME (default: bk-dbmon)
    /// - ACTUATOR_PACKAGE_DIR (default: /data/install)
    /// - ACTUATOR_EXTRACT_DIR (default: /data/dbbak)
    /// - ACTUATOR_EXPORTER_CONF_DIR (default: /home/mysql/.exporter)
    /// - ACTUATOR_REPORT_DIR (default: /home/mysql/dbareport/)
    /// - ACTUATOR_REPORT_LEFT_DAY (default: 15)
    /// - ACTUATOR_AGENT_HTTP_ADDRESS (default: 127.0.0.1:6677)
    /// - ACTUATOR_SHELL_TIMEOUT (seconds, default: 60)
    /// - ACTUATOR_STOP_TIMEOUT (seconds, default: 10)
    /// - ACTUATOR_ADMIN_USER / ACTUATOR_ADMIN_PASSWORD
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = PathLayout::default();

        let layout = PathLayout {
            install_root: env_path("ACTUATOR_INSTALL_ROOT").unwrap_or(defaults.install_root),
            agent_name: std::env::var("ACTUATOR_AGENT_NAME").unwrap_or(defaults.agent_name),
            package_dir: env_path("ACTUATOR_PACKAGE_DIR").unwrap_or(defaults.package_dir),
            extract_dir: env_path("ACTUATOR_EXTRACT_DIR").unwrap_or(defaults.extract_dir),
            exporter_conf_dir: env_path("ACTUATOR_EXPORTER_CONF_DIR")
                .unwrap_or(defaults.exporter_conf_dir),
        };

        let mut config = Self::new(layout);

        if let Ok(dir) = std::env::var("ACTUATOR_REPORT_DIR") {
            config.report_dir = dir;
        }

        if let Some(days) = env_parse::<u32>("ACTUATOR_REPORT_LEFT_DAY")? {
            config.report_left_day = days;
        }

        if let Ok(addr) = std::env::var("ACTUATOR_AGENT_HTTP_ADDRESS") {
            config.agent_http_address = addr;
        }

        if let Some(timeout) = env_secs("ACTUATOR_SHELL_TIMEOUT")? {
            config.shell_timeout = timeout;
        }

        if let Some(timeout) = env_secs("ACTUATOR_STOP_TIMEOUT")? {
            config.stop_timeout = timeout;
        }

        config.admin_user = std::env::var("ACTUATOR_ADMIN_USER").unwrap_or_default();
        config.admin_password = std::env::var("ACTUATOR_ADMIN_PASSWORD").unwrap_or_default();

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let name = &self.layout.agent_name;
        if name.is_empty() {
            anyhow::bail!("agent_name cannot be empty");
        }

        if name.contains('/') || name == "." || name == ".." {
            anyhow::bail!("agent_name must be a plain file name, got '{}'", name);
        }

        for (label, path) in [
            ("install_root", &self.layout.install_root),
            ("package_dir", &self.layout.package_dir),
            ("extract_dir", &self.layout.extract_dir),
            ("exporter_conf_dir", &self.layout.exporter_conf_dir),
        ] {
            if !path.is_absolute() {
                anyhow::bail!("{} must be an absolute path, got {}", label, path.display());
            }
        }

        if self.shell_timeout.is_zero() {
            anyhow::bail!("shell_timeout must be greater than 0");
        }

        if self.stop_timeout.is_zero() {
            anyhow::bail!("stop_timeout must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(PathLayout::default())
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn env_secs(key: &str) -> anyhow::Result<Option<Duration>> {
    Ok(env_parse::<u64>(key)?.map(Duration::from_secs))
}

fn env_parse<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    parse_var(key, std::env::var(key).ok())
}

/// Parses the raw value of `key`; unset or blank reads as `None`
fn parse_var<T>(key: &str, raw: Option<String>) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.filter(|v| !v.trim().is_empty())
        .map(|v| {
            v.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value '{}' for {}", v, key))
        })
        .transpose()
}
