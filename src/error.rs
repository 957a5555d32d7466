//! Error types for the synchronization core

use thiserror::Error;

/// Errors raised by local state, codecs, channels and configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// The entity does not declare an attribute with this name
    #[error("'{entity}' has no attribute named '{name}'")]
    UnknownAttribute { entity: String, name: String },

    /// A value does not match the declared kind of the attribute
    #[error("attribute '{name}' expects {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: String,
    },

    /// A user-supplied transform rejected a value
    #[error("transform failed for '{name}': {reason}")]
    Transform { name: String, reason: String },

    /// An inbound wire message could not be decoded
    #[error("malformed channel message: {0}")]
    Decode(String),

    /// The channel has already been closed
    #[error("channel '{0}' is closed")]
    ChannelClosed(String),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SyncError::UnknownAttribute {
            entity: "slider".to_string(),
            name: "bogus".to_string(),
        };
        assert_eq!(err.to_string(), "'slider' has no attribute named 'bogus'");

        let err = SyncError::TypeMismatch {
            name: "value".to_string(),
            expected: "boolean",
            found: "\"yes\"".to_string(),
        };
        assert!(err.to_string().contains("expects boolean"));
    }
}
