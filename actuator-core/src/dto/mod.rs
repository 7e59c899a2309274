//! Job parameter payloads
//!
//! Every job receives one raw JSON payload from the dispatcher. The payload
//! is decoded into one of the parameter types below and validated as a
//! whole before the job is allowed to run: a payload is either fully
//! accepted or rejected without side effects.

pub mod install;
pub mod schema_check;

use serde::de::DeserializeOwned;
use std::net::IpAddr;
use thiserror::Error;

/// Errors raised while decoding or validating a job payload
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Payload is not valid JSON or does not match the expected shape
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// A required field is missing or empty
    #[error("missing required field: {0}")]
    MissingField(String),

    /// A field that must hold an IP address does not
    #[error("field {field} is not a valid IP address: '{value}'")]
    InvalidAddress { field: String, value: String },

    /// A port lies outside the accepted range
    #[error("field {field} must be within {min}..={max}, got {port}")]
    PortOutOfRange {
        field: String,
        port: u32,
        min: u32,
        max: u32,
    },
}

/// Parameters that can check their own constraints
pub trait Validate {
    /// Checks every constraint; the first violation is returned
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Decodes a raw payload and validates it in one step
pub fn decode_payload<T>(raw: &str) -> Result<T, ValidationError>
where
    T: DeserializeOwned + Validate,
{
    let params: T =
        serde_json::from_str(raw).map_err(|e| ValidationError::InvalidPayload(e.to_string()))?;
    params.validate()?;
    Ok(params)
}

pub(crate) fn require(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field.to_string()));
    }
    Ok(())
}

pub(crate) fn require_ip(field: &str, value: &str) -> Result<(), ValidationError> {
    require(field, value)?;
    value
        .trim()
        .parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::InvalidAddress {
            field: field.to_string(),
            value: value.to_string(),
        })
}

pub(crate) fn require_port(field: &str, port: u32, min: u32, max: u32) -> Result<(), ValidationError> {
    if port < min || port > max {
        return Err(ValidationError::PortOutOfRange {
            field: field.to_string(),
            port,
            min,
            max,
        });
    }
    Ok(())
}
