//! Recording fakes for the command and process seams

use actuator_core::domain::artifact::parse_declared_version;
use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::JobError;
use crate::service::ServiceController;
use crate::shell::{CommandOutput, CommandRunner, display_command};

/// Command runner that records every call and emulates the agent tooling
///
/// `<binary> -v` prints the binary file's content, so a fake binary written
/// as `agent v1.4` reports `v1.4`. `tar -zxf <pkg> -C <dir>` creates the
/// versioned directory with such a binary inside, versioned after the
/// package name.
pub struct RecordingShell {
    agent: String,
    calls: Mutex<Vec<String>>,
    extract_nothing: AtomicBool,
}

impl RecordingShell {
    pub fn new(agent: &str) -> Self {
        Self {
            agent: agent.to_string(),
            calls: Mutex::new(Vec::new()),
            extract_nothing: AtomicBool::new(false),
        }
    }

    /// Makes `tar` succeed without producing anything
    pub fn extract_nothing(&self) {
        self.extract_nothing.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn fake_extract(&self, args: &[String]) -> CommandOutput {
        if self.extract_nothing.load(Ordering::SeqCst) {
            return CommandOutput::default();
        }

        let package = Path::new(&args[1]);
        let dest = Path::new(&args[3]);
        let name = package.file_name().unwrap().to_string_lossy().to_string();
        let version = parse_declared_version(&self.agent, &name).unwrap();
        let dir = dest.join(name.trim_end_matches(".tar.gz"));

        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(&self.agent), format!("{} {}\n", self.agent, version)).unwrap();
        CommandOutput::default()
    }
}

#[async_trait]
impl CommandRunner for RecordingShell {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        _timeout: Duration,
    ) -> Result<CommandOutput, JobError> {
        self.calls.lock().unwrap().push(display_command(program, args));

        if args == ["-v"] {
            return Ok(match fs::read_to_string(program) {
                Ok(content) => CommandOutput {
                    stdout: content,
                    ..Default::default()
                },
                Err(e) => CommandOutput {
                    stderr: e.to_string(),
                    exit_code: 127,
                    ..Default::default()
                },
            });
        }

        if program == "tar" {
            return Ok(self.fake_extract(args));
        }

        Ok(CommandOutput {
            exit_code: 127,
            ..Default::default()
        })
    }
}

/// Process controller that only tracks a running flag
#[derive(Default)]
pub struct FakeService {
    running: AtomicBool,
    events: Mutex<Vec<&'static str>>,
}

impl FakeService {
    /// Every stop and start request in order
    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }

    pub fn is_up(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceController for FakeService {
    async fn is_running(&self) -> Result<bool, JobError> {
        Ok(self.is_up())
    }

    async fn stop(&self) -> Result<(), JobError> {
        self.events.lock().unwrap().push("stop");
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn start(&self) -> Result<(), JobError> {
        self.events.lock().unwrap().push("start");
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }
}
