//! Service layer
//!
//! The idempotent building blocks jobs are composed from. Each one
//! observes the node before acting and reports whether it changed anything,
//! so a job can skip steps that depend on an unchanged input.
//!
//! Process control is trait-based so jobs can be tested against fakes.

mod installer;
mod lifecycle;
pub mod reconciler;

pub use installer::VersionedArtifactInstaller;
pub use lifecycle::{ServiceController, SupervisedProcess};
pub use reconciler::ConfigReconciler;
