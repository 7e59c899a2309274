//! Versioned artifact installation
//!
//! The active installation is whatever the redirect pointer
//! `<install_root>/<agent>` resolves to. An upgrade extracts the package
//! into `<extract_dir>/<agent>-<version>` and repoints the link in a single
//! rename. Installed state is observed afresh on every call; nothing is
//! remembered between runs.

use actuator_core::domain::artifact::{ArtifactDescriptor, MediaPackage};
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::ServiceController;
use crate::config::PathLayout;
use crate::error::JobError;
use crate::shell::CommandRunner;

/// On-node facts about the current installation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledState {
    /// Whether a binary exists behind the pointer
    pub binary_present: bool,
    /// Version the binary reports; `None` when absent or unreadable
    pub version: Option<String>,
    /// Raw target of the redirect pointer, if it is a symlink
    pub pointer_target: Option<PathBuf>,
    /// Whether the supervised process is running
    pub running: bool,
}

impl InstalledState {
    /// True when the installed binary reports exactly `declared`
    pub fn satisfies(&self, declared: &str) -> bool {
        self.binary_present && !declared.is_empty() && self.version.as_deref() == Some(declared)
    }
}

/// Installs agent packages behind the redirect pointer
pub struct VersionedArtifactInstaller {
    layout: PathLayout,
    shell: Arc<dyn CommandRunner>,
    service: Arc<dyn ServiceController>,
    shell_timeout: Duration,
}

impl VersionedArtifactInstaller {
    pub fn new(
        layout: PathLayout,
        shell: Arc<dyn CommandRunner>,
        service: Arc<dyn ServiceController>,
        shell_timeout: Duration,
    ) -> Self {
        Self {
            layout,
            shell,
            service,
            shell_timeout,
        }
    }

    /// Observes the current installation
    pub async fn observe(&self) -> Result<InstalledState, JobError> {
        let binary = self.layout.binary_path();
        let binary_present = binary.is_file();

        let version = if binary_present {
            self.probe_version(&binary).await
        } else {
            None
        };

        let link = self.layout.link_path();
        let pointer_target = match fs::read_link(&link) {
            Ok(target) => Some(target),
            Err(e) if e.kind() == ErrorKind::NotFound || e.kind() == ErrorKind::InvalidInput => None,
            Err(e) => return Err(JobError::fs("readlink", &link, e)),
        };

        Ok(InstalledState {
            binary_present,
            version,
            pointer_target,
            running: self.service.is_running().await?,
        })
    }

    /// Makes the pointer resolve to an installation of `package`
    ///
    /// Returns `true` if anything was installed, `false` if the installed
    /// binary already reports the declared version.
    pub async fn ensure(&self, package: &MediaPackage) -> Result<bool, JobError> {
        let artifact = ArtifactDescriptor::parse(
            &self.layout.agent_name,
            &self.layout.package_dir,
            package,
        )?;

        let state = self.observe().await?;
        debug!("Installed state: {:?}", state);

        if state.satisfies(&artifact.declared_version) {
            info!(
                "{} already at version {}, nothing to install",
                self.layout.agent_name, artifact.declared_version
            );
            return Ok(false);
        }

        info!(
            "Installing {} {} (installed: {}, pointer: {}, running: {})",
            self.layout.agent_name,
            artifact.declared_version,
            state.version.as_deref().unwrap_or("unknown"),
            state
                .pointer_target
                .as_deref()
                .map_or_else(|| "none".into(), Path::to_string_lossy),
            state.running
        );

        if !artifact.source.is_file() {
            return Err(JobError::PackageMissing {
                path: artifact.source,
            });
        }

        self.service.stop().await?;
        self.remove_previous()?;

        let versioned = self.layout.versioned_dir(&artifact.dir_name);
        self.extract(&artifact, &versioned).await?;
        self.swap_pointer(&versioned)?;

        info!(
            "{} {} installed at {}",
            self.layout.agent_name,
            artifact.declared_version,
            versioned.display()
        );
        Ok(true)
    }

    /// Runs `<binary> -v` and takes the second field as the version
    async fn probe_version(&self, binary: &Path) -> Option<String> {
        let program = binary.to_string_lossy();
        let output = match self
            .shell
            .run(&program, &["-v".to_string()], self.shell_timeout)
            .await
        {
            Ok(output) if output.success() => output,
            Ok(output) => {
                warn!("{} -v exited with {}", program, output.exit_code);
                return None;
            }
            Err(e) => {
                warn!("Failed to probe {} version: {}", program, e);
                return None;
            }
        };

        output
            .stdout
            .split_whitespace()
            .nth(1)
            .map(str::to_string)
    }

    /// Removes the pointer and the directory it resolves to
    fn remove_previous(&self) -> Result<(), JobError> {
        let link = self.layout.link_path();
        let meta = match fs::symlink_metadata(&link) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(JobError::fs("stat", &link, e)),
        };

        if !meta.file_type().is_symlink() {
            info!("Removing {}", link.display());
            return remove_path(&link);
        }

        // A dangling pointer has nothing left to resolve
        let resolved = fs::canonicalize(&link).ok();

        info!("Removing pointer {}", link.display());
        remove_path(&link)?;

        if let Some(dir) = resolved {
            info!("Removing previous installation {}", dir.display());
            remove_path(&dir)?;
        }

        Ok(())
    }

    async fn extract(&self, artifact: &ArtifactDescriptor, versioned: &Path) -> Result<(), JobError> {
        let extract_dir = &self.layout.extract_dir;
        fs::create_dir_all(extract_dir).map_err(|e| JobError::fs("create", extract_dir, e))?;

        // Leftover from an interrupted attempt; nothing points at it any more
        if fs::symlink_metadata(versioned).is_ok() {
            info!("Removing stale {}", versioned.display());
            remove_path(versioned)?;
        }

        info!(
            "Extracting {} into {}",
            artifact.source.display(),
            extract_dir.display()
        );
        let args = vec![
            "-zxf".to_string(),
            artifact.source.to_string_lossy().to_string(),
            "-C".to_string(),
            extract_dir.to_string_lossy().to_string(),
        ];
        self.shell.run_checked("tar", &args, self.shell_timeout).await?;

        if !versioned.is_dir() {
            return Err(JobError::ExtractionIncomplete {
                package: artifact.source.clone(),
                expected: versioned.to_path_buf(),
            });
        }

        Ok(())
    }

    /// Points the link at `versioned` in one rename
    fn swap_pointer(&self, versioned: &Path) -> Result<(), JobError> {
        let link = self.layout.link_path();

        if fs::read_link(&link).is_ok_and(|target| target == versioned) {
            info!("{} already points at {}", link.display(), versioned.display());
            return Ok(());
        }

        let root = &self.layout.install_root;
        fs::create_dir_all(root).map_err(|e| JobError::fs("create", root, e))?;

        let tmp = root.join(format!(
            "{}.tmp-{}",
            self.layout.agent_name,
            std::process::id()
        ));
        if fs::symlink_metadata(&tmp).is_ok() {
            remove_path(&tmp)?;
        }

        symlink(versioned, &tmp).map_err(|e| JobError::fs("symlink", &tmp, e))?;
        if let Err(e) = fs::rename(&tmp, &link) {
            let _ = fs::remove_file(&tmp);
            return Err(JobError::fs("rename", &link, e));
        }

        info!("Pointed {} at {}", link.display(), versioned.display());
        Ok(())
    }
}

/// Removes a file, symlink or directory tree; absent is success
fn remove_path(path: &Path) -> Result<(), JobError> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(JobError::fs("stat", path, e)),
    };

    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(JobError::fs("remove", path, e)),
    }
}
