//! Supervised process lifecycle
//!
//! Stops and starts the long-running agent by convention: a fixed binary
//! behind the redirect pointer, a pid file next to it, signals for stop.
//! Both directions are idempotent; asking for the state the process is
//! already in succeeds without touching anything.
//!
//! The pid file outlives reboots, so a recorded pid only counts as the
//! agent while `/proc/<pid>` shows it running the agent binary. Anything
//! else is a stale file and is never signalled.

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, waitpid};
use nix::unistd::Pid;
use std::fs::{self, OpenOptions};
use std::ffi::OsStr;
use std::io::ErrorKind;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::PathLayout;
use crate::error::JobError;

/// How often liveness is re-checked while waiting for an exit
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long a freshly started process must survive to count as started
const START_SETTLE: Duration = Duration::from_millis(300);

/// Stops and starts one supervised process
#[async_trait]
pub trait ServiceController: Send + Sync {
    /// Observes whether the process is running right now
    async fn is_running(&self) -> Result<bool, JobError>;

    /// Stops the process; already stopped is success
    async fn stop(&self) -> Result<(), JobError>;

    /// Starts the process; already running is success
    async fn start(&self) -> Result<(), JobError>;
}

/// The agent process managed through its pid file
pub struct SupervisedProcess {
    layout: PathLayout,
    stop_timeout: Duration,
}

impl SupervisedProcess {
    /// Creates a controller for the agent described by `layout`
    pub fn new(layout: PathLayout, stop_timeout: Duration) -> Self {
        Self {
            layout,
            stop_timeout,
        }
    }

    /// Reads the recorded pid; absent or garbled files read as `None`
    fn read_pid(&self) -> Result<Option<Pid>, JobError> {
        let path = self.layout.pid_path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(JobError::fs("read", &path, e)),
        };

        match content.trim().parse::<i32>() {
            // 0 and 1 would address the process group and init
            Ok(raw) if raw > 1 => Ok(Some(Pid::from_raw(raw))),
            _ => {
                warn!("Ignoring malformed pid file {}", path.display());
                Ok(None)
            }
        }
    }

    /// The recorded pid, if it is alive and running the agent binary
    fn agent_pid(&self) -> Result<Option<Pid>, JobError> {
        Ok(self
            .read_pid()?
            .filter(|pid| is_alive(*pid) && runs_binary(*pid, &self.layout.binary_path())))
    }

    fn remove_pid_file(&self) -> Result<(), JobError> {
        let path = self.layout.pid_path();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(JobError::fs("remove", &path, e)),
        }
    }

    fn write_pid_file(&self, pid: u32) -> Result<(), JobError> {
        let path = self.layout.pid_path();
        let tmp = path.with_extension("pid.tmp");
        fs::write(&tmp, format!("{}\n", pid)).map_err(|e| JobError::fs("write", &tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| JobError::fs("rename", &path, e))?;
        Ok(())
    }

    /// Waits up to `limit` for `pid` to disappear
    async fn wait_for_exit(&self, pid: Pid, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            if !is_alive(pid) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl ServiceController for SupervisedProcess {
    async fn is_running(&self) -> Result<bool, JobError> {
        Ok(self.agent_pid()?.is_some())
    }

    async fn stop(&self) -> Result<(), JobError> {
        let binary = self.layout.binary_path();
        let pid = match self.read_pid()? {
            Some(pid) if is_alive(pid) && runs_binary(pid, &binary) => pid,
            Some(pid) => {
                if is_alive(pid) {
                    warn!(
                        "pid {} from {} belongs to another process, leaving it alone",
                        pid,
                        self.layout.pid_path().display()
                    );
                }
                info!("{} already stopped, removing stale pid file", self.layout.agent_name);
                return self.remove_pid_file();
            }
            None => {
                debug!("{} not running", self.layout.agent_name);
                return Ok(());
            }
        };

        info!("Stopping {} (pid {})", self.layout.agent_name, pid);
        signal(pid, Signal::SIGTERM)?;

        if !self.wait_for_exit(pid, self.stop_timeout).await {
            warn!(
                "{} (pid {}) did not exit within {:?}, sending SIGKILL",
                self.layout.agent_name, pid, self.stop_timeout
            );
            signal(pid, Signal::SIGKILL)?;

            if !self.wait_for_exit(pid, self.stop_timeout).await {
                return Err(JobError::Service(format!(
                    "{} (pid {}) survived SIGKILL",
                    self.layout.agent_name, pid
                )));
            }
        }

        self.remove_pid_file()?;
        info!("{} stopped", self.layout.agent_name);
        Ok(())
    }

    async fn start(&self) -> Result<(), JobError> {
        if self.is_running().await? {
            info!("{} already running", self.layout.agent_name);
            return Ok(());
        }
        self.remove_pid_file()?;

        let binary = self.layout.binary_path();
        if !binary.is_file() {
            return Err(JobError::Service(format!(
                "cannot start {}: {} does not exist",
                self.layout.agent_name,
                binary.display()
            )));
        }

        let log_path = self.layout.log_path();
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| JobError::fs("open", &log_path, e))?;
        let log_err = log
            .try_clone()
            .map_err(|e| JobError::fs("open", &log_path, e))?;

        info!("Starting {}", binary.display());

        let mut child = Command::new(&binary)
            .arg(format!("--config={}", self.layout.config_path().display()))
            .current_dir(self.layout.link_path())
            .stdin(Stdio::null())
            .stdout(log)
            .stderr(log_err)
            .process_group(0)
            .spawn()
            .map_err(|e| JobError::Service(format!("failed to spawn {}: {}", binary.display(), e)))?;

        self.write_pid_file(child.id())?;

        tokio::time::sleep(START_SETTLE).await;

        match child.try_wait() {
            Ok(None) => {
                info!("{} started (pid {})", self.layout.agent_name, child.id());
                Ok(())
            }
            Ok(Some(status)) => {
                self.remove_pid_file()?;
                Err(JobError::Service(format!(
                    "{} exited right after start with {}, see {}",
                    self.layout.agent_name,
                    status,
                    log_path.display()
                )))
            }
            Err(e) => Err(JobError::Service(format!(
                "failed to check {} after start: {}",
                self.layout.agent_name, e
            ))),
        }
    }
}

fn signal(pid: Pid, sig: Signal) -> Result<(), JobError> {
    match kill(pid, sig) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(JobError::Service(format!(
            "failed to send {} to pid {}: {}",
            sig, pid, e
        ))),
    }
}

/// Probes `pid` with signal 0
///
/// Reaps the process first in case it is our own exited child, otherwise
/// a zombie would keep answering the probe.
fn is_alive(pid: Pid) -> bool {
    let _ = waitpid(pid, Some(WaitPidFlag::WNOHANG));
    match kill(pid, None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Whether `pid` runs `binary`, judged from `/proc`
///
/// Scripts run under an interpreter, so the binary may show up as an
/// argument rather than as the executable. An unreadable entry never counts.
fn runs_binary(pid: Pid, binary: &Path) -> bool {
    let proc_dir = PathBuf::from(format!("/proc/{}", pid));
    let resolved = fs::canonicalize(binary).ok();
    let is_binary = |candidate: &Path| {
        candidate == binary || resolved.as_deref().is_some_and(|r| candidate == r)
    };

    if let Ok(cmdline) = fs::read(proc_dir.join("cmdline")) {
        let found = cmdline
            .split(|b| *b == 0)
            .filter(|arg| !arg.is_empty())
            .any(|arg| is_binary(Path::new(OsStr::from_bytes(arg))));
        if found {
            return true;
        }
    }

    fs::read_link(proc_dir.join("exe")).is_ok_and(|exe| is_binary(&exe))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Agent stand-in that keeps its own path on the command line
    const AGENT_SCRIPT: &str = "#!/bin/sh\ntrap 'exit 0' TERM\nwhile true; do sleep 0.1; done\n";

    fn install_fake_agent(layout: &PathLayout, script: &str) {
        fs::create_dir_all(layout.link_path()).unwrap();
        let binary = layout.binary_path();
        fs::write(&binary, script).unwrap();
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn controller(root: &Path) -> (PathLayout, SupervisedProcess) {
        let layout = PathLayout::under(root, "agent");
        let process = SupervisedProcess::new(layout.clone(), Duration::from_secs(2));
        (layout, process)
    }

    #[tokio::test]
    async fn test_stop_when_never_started() {
        let tmp = TempDir::new().unwrap();
        let (_, process) = controller(tmp.path());

        assert!(!process.is_running().await.unwrap());
        process.stop().await.unwrap();
        process.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_pid_file_is_cleaned_up() {
        let tmp = TempDir::new().unwrap();
        let (layout, process) = controller(tmp.path());
        fs::create_dir_all(layout.link_path()).unwrap();
        fs::write(layout.pid_path(), format!("{}\n", i32::MAX)).unwrap();

        assert!(!process.is_running().await.unwrap());
        process.stop().await.unwrap();
        assert!(!layout.pid_path().exists());
    }

    #[tokio::test]
    async fn test_malformed_pid_file_reads_as_stopped() {
        let tmp = TempDir::new().unwrap();
        let (layout, process) = controller(tmp.path());
        fs::create_dir_all(layout.link_path()).unwrap();
        fs::write(layout.pid_path(), "1\n").unwrap();

        assert!(!process.is_running().await.unwrap());
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let tmp = TempDir::new().unwrap();
        let (layout, process) = controller(tmp.path());
        install_fake_agent(&layout, AGENT_SCRIPT);

        process.start().await.unwrap();
        assert!(process.is_running().await.unwrap());
        let pid = fs::read_to_string(layout.pid_path()).unwrap();

        process.start().await.unwrap();
        assert_eq!(fs::read_to_string(layout.pid_path()).unwrap(), pid);

        process.stop().await.unwrap();
        assert!(!process.is_running().await.unwrap());
        assert!(!layout.pid_path().exists());

        process.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_reports_immediate_exit() {
        let tmp = TempDir::new().unwrap();
        let (layout, process) = controller(tmp.path());
        install_fake_agent(&layout, "#!/bin/sh\nexit 1\n");

        let err = process.start().await.unwrap_err();
        assert!(matches!(err, JobError::Service(_)));
        assert!(!layout.pid_path().exists());
    }

    #[tokio::test]
    async fn test_start_without_binary() {
        let tmp = TempDir::new().unwrap();
        let (_, process) = controller(tmp.path());

        let err = process.start().await.unwrap_err();
        assert!(matches!(err, JobError::Service(_)));
    }

    #[tokio::test]
    async fn test_foreign_pid_is_never_signalled() {
        let tmp = TempDir::new().unwrap();
        let (layout, process) = controller(tmp.path());
        install_fake_agent(&layout, AGENT_SCRIPT);

        let mut foreign = Command::new("sleep").arg("30").spawn().unwrap();
        let foreign_pid = Pid::from_raw(foreign.id() as i32);
        fs::write(layout.pid_path(), format!("{}\n", foreign.id())).unwrap();

        assert!(!process.is_running().await.unwrap());

        process.stop().await.unwrap();
        assert!(!layout.pid_path().exists());
        assert!(kill(foreign_pid, None).is_ok());

        fs::write(layout.pid_path(), format!("{}\n", foreign.id())).unwrap();
        process.start().await.unwrap();
        let recorded = fs::read_to_string(layout.pid_path()).unwrap();
        assert_ne!(recorded.trim(), foreign.id().to_string());
        assert!(process.is_running().await.unwrap());

        process.stop().await.unwrap();
        assert!(kill(foreign_pid, None).is_ok());

        foreign.kill().unwrap();
        foreign.wait().unwrap();
    }
}
