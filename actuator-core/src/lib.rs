//! Actuator Core
//!
//! Core types and abstractions for the node actuator.
//!
//! This crate contains:
//! - Domain types: job lifecycle, artifact descriptors, shard check records
//! - DTOs: job parameter payloads and their validation rules
//!
//! Note: nothing in here touches the filesystem, the process table or the
//! network. Observation and mutation of node state live in the runner.

pub mod domain;
pub mod dto;
