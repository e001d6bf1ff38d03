//! # Validation
//!
//! Shared validation helpers for resource names and map keys.

use crate::constants::MAX_NAME_LENGTH;
use regex::Regex;
use std::sync::LazyLock;

/// Malformed desired state
///
/// Surfaced to users as a `Stalled` condition. Never retried until the
/// desired state changes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Key-path of the offending field
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

// RFC 1123 label: lowercase alphanumerics and '-', must start and end alphanumeric
static DNS_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$")
        .expect("Failed to compile DNS label regex - this should never happen")
});

static DATA_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-._a-zA-Z0-9]+$")
        .expect("Failed to compile data key regex - this should never happen")
});

/// Validate a DNS-1123 label (names, namespaces, container names)
pub fn validate_dns_label(value: &str, field: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    if value.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::new(
            field,
            format!("'{value}' exceeds {MAX_NAME_LENGTH} characters"),
        ));
    }
    if !DNS_LABEL.is_match(value) {
        return Err(ValidationError::new(
            field,
            format!("'{value}' must be a lowercase RFC 1123 label (e.g. 'voting-app')"),
        ));
    }
    Ok(())
}

/// Validate a ConfigMap/Secret data key
pub fn validate_data_key(key: &str, field: &str) -> Result<(), ValidationError> {
    if DATA_KEY.is_match(key) {
        Ok(())
    } else {
        Err(ValidationError::new(
            format!("{field}.{key}"),
            "keys may only contain alphanumerics, '-', '_' and '.'",
        ))
    }
}

/// Validate a TCP port number
pub fn validate_port(port: u32, field: &str) -> Result<(), ValidationError> {
    if (1..=65535).contains(&port) {
        Ok(())
    } else {
        Err(ValidationError::new(
            field,
            format!("{port} is not a valid port (1-65535)"),
        ))
    }
}
