//! Core domain types
//!
//! This module contains the core domain structures used across the actuator.
//! These types describe what a job is, what an installable artifact is, and
//! what a schema consistency verdict looks like once persisted.

pub mod artifact;
pub mod check;
pub mod job;
