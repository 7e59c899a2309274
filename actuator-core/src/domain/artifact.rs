//! Artifact domain types
//!
//! An artifact is a delivered `.tar.gz` package whose file name embeds the
//! version it carries, e.g. `bk-dbmon-v1.4.tar.gz`. The version is parsed
//! from the name before anything on disk is touched.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const PACKAGE_SUFFIX: &str = ".tar.gz";

/// Errors raised while interpreting an artifact name
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArtifactNameError {
    /// The package name does not follow `<agent>-v<major>.<minor>[.<patch>].tar.gz`
    #[error("malformed artifact name '{name}', expected e.g. {agent}-v0.1.tar.gz")]
    MalformedArtifactName { name: String, agent: String },
}

/// Package reference as handed over in job parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPackage {
    /// Package file name, relative to the package directory
    pub pkg: String,
    /// Checksum announced by the sender; informational only
    #[serde(default)]
    pub pkg_md5: String,
}

/// A parsed, installable artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    /// Absolute location of the package file
    pub source: PathBuf,
    /// Version parsed from the package name (e.g. `v1.4`)
    pub declared_version: String,
    /// Directory produced by extracting the package (e.g. `bk-dbmon-v1.4`)
    pub dir_name: String,
}

impl ArtifactDescriptor {
    /// Builds a descriptor for `package` located under `package_dir`
    ///
    /// # Errors
    /// Returns `MalformedArtifactName` if the package name does not carry
    /// a version for `agent`.
    pub fn parse(
        agent: &str,
        package_dir: &Path,
        package: &MediaPackage,
    ) -> Result<Self, ArtifactNameError> {
        let declared_version = parse_declared_version(agent, &package.pkg)?;
        let dir_name = package
            .pkg
            .strip_suffix(PACKAGE_SUFFIX)
            .unwrap_or(&package.pkg)
            .to_string();

        Ok(Self {
            source: package_dir.join(&package.pkg),
            declared_version,
            dir_name,
        })
    }
}

/// Extracts the version tag embedded in an artifact file name
///
/// ```
/// use actuator_core::domain::artifact::parse_declared_version;
///
/// let version = parse_declared_version("agent", "agent-v1.4.tar.gz").unwrap();
/// assert_eq!(version, "v1.4");
/// ```
pub fn parse_declared_version(agent: &str, name: &str) -> Result<String, ArtifactNameError> {
    let malformed = || ArtifactNameError::MalformedArtifactName {
        name: name.to_string(),
        agent: agent.to_string(),
    };

    let pattern = format!(
        r"^{}-(v\d+\.\d+(?:\.\d+)?)\.tar\.gz$",
        regex::escape(agent)
    );
    let re = Regex::new(&pattern).map_err(|_| malformed())?;

    re.captures(name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(malformed)
}
