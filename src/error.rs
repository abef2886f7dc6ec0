use thiserror::Error;

/// Main error type for the platooning coordination engine
#[derive(Error, Debug)]
pub enum ConvoyError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Wire protocol errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Unexpected state: {0}")]
    UnexpectedState(String),

    // External collaborator errors
    #[error("Component failure: {component} - {reason}")]
    ComponentFailure { component: String, reason: String },

    #[error("Stale data: {0}")]
    StaleData(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for ConvoyError
pub type Result<T> = std::result::Result<T, ConvoyError>;

/// Errors raised by the strict mobility payload grammar.
///
/// Malformed payloads are logged and discarded by the engine; these variants
/// exist so a mis-parse is reported distinctly instead of silently producing
/// wrong field values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Unknown operation kind: {0}")]
    UnknownKind(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Unexpected key: expected {expected}, found {found}")]
    UnexpectedKey {
        expected: &'static str,
        found: String,
    },

    #[error("Invalid number in field {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Trailing input after payload: {0}")]
    TrailingInput(String),
}
