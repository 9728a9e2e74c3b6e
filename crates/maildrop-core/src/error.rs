//! Error types for the core library.

use thiserror::Error;

use crate::config::ValidationError;
use crate::credentials::SecretError;
use crate::transport::TransportError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Mail transport operation failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Secret lookup failed.
    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration failed validation.
    #[error("Invalid configuration: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
