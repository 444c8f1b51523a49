//! Error types for hubkit
//!
//! This module contains the error types used throughout hubkit: storage errors
//! raised by durable hit queues, shared state versioning errors, and the
//! `HubError` type that unifies them for the event hub surface.
//!
//! "Not ready" conditions (an extension deferring an event, a hit processor asking
//! for a retry) are control flow, not errors, and never appear here.

use std::path::PathBuf;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Durable storage error types
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Record encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("Corrupt record at {path}: {reason}")]
    CorruptRecord { path: PathBuf, reason: String },
    #[error("Storage unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Shared state versioning error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SharedStateError {
    #[error("Shared state for {owner} at version {version} is older than latest version {latest}")]
    StaleVersion {
        owner: String,
        version: u64,
        latest: u64,
    },
    #[error("No pending shared state for {owner} at version {version}")]
    NotPending { owner: String, version: u64 },
}

// ----------------------------------------------------------------------------
// Hub Error
// ----------------------------------------------------------------------------

/// Core error type for the event hub
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// An extension with the same name is already registered
    #[error("Extension already registered: {name}")]
    DuplicateExtension { name: String },

    #[error("Extension not registered: {name}")]
    ExtensionNotFound { name: String },

    #[error("Extension name must not be empty")]
    InvalidExtensionName,

    /// The extension's registration hook failed
    #[error("Registration of {name} failed: {reason}")]
    Registration { name: String, reason: String },

    /// The hub backing an extension runtime handle has been dropped
    #[error("Event hub is no longer available")]
    HubUnavailable,

    #[error("Shared state error: {0}")]
    SharedState(#[from] SharedStateError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Channel communication error between hub tasks
    #[error("Channel error: {message}")]
    Channel { message: String },

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl HubError {
    /// Create a duplicate registration error for an extension name
    pub fn duplicate_extension<T: Into<String>>(name: T) -> Self {
        HubError::DuplicateExtension { name: name.into() }
    }

    /// Create an extension-not-found error
    pub fn extension_not_found<T: Into<String>>(name: T) -> Self {
        HubError::ExtensionNotFound { name: name.into() }
    }

    /// Create a channel error with a message
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        HubError::Channel {
            message: message.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        HubError::Configuration {
            reason: reason.into(),
        }
    }

    /// Whether this error reports a duplicate registration
    pub fn is_duplicate_extension(&self) -> bool {
        matches!(self, HubError::DuplicateExtension { .. })
    }
}

impl StorageError {
    /// Create a corrupt record error
    pub fn corrupt<P: Into<PathBuf>, R: Into<String>>(path: P, reason: R) -> Self {
        StorageError::CorruptRecord {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type HubResult<T> = core::result::Result<T, HubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HubError::duplicate_extension("com.example.analytics");
        assert_eq!(
            err.to_string(),
            "Extension already registered: com.example.analytics"
        );
        assert!(err.is_duplicate_extension());

        let err: HubError = SharedStateError::StaleVersion {
            owner: "config".into(),
            version: 3,
            latest: 7,
        }
        .into();
        assert!(err.to_string().contains("older than latest version 7"));
        assert!(!err.is_duplicate_extension());
    }

    #[test]
    fn test_storage_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: HubError = StorageError::from(io).into();
        assert!(matches!(err, HubError::Storage(StorageError::Io(_))));
    }
}
