//! Error types for the reconciliation core
//!
//! Only registry and settings mutations surface errors. The reconciliation
//! path itself never fails outward: suspended or unreachable endpoints are
//! classified and recovered, and per-group faults are logged and skipped.

/// Result type alias using the core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in registry, settings and group processing
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Endpoint not found in the registry
    #[error("Endpoint not found: {0}")]
    EndpointNotFound(String),

    /// Endpoint identifier already registered
    #[error("Endpoint already registered: {0}")]
    DuplicateEndpoint(String),

    /// Tracked state cannot be used for a correction (non-finite target, etc.)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }

    /// Check if this error refers to an unknown endpoint
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::EndpointNotFound(_))
    }

    /// Check if this error is a registration conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::DuplicateEndpoint(_))
    }
}
