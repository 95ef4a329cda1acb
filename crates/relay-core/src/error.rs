//! Domain-specific error types following panic-free policy.

use crate::SessionId;
use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone)]
pub enum DomainError {
    /// Session not found in registry
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: SessionId },

    /// Session already exists
    #[error("Session already exists: {session_id}")]
    SessionAlreadyExists { session_id: SessionId },

    /// Invalid field value
    #[error("Invalid {field}: {value} (expected {expected})")]
    InvalidFieldValue {
        field: String,
        value: String,
        expected: String,
    },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_error_display() {
        let err = DomainError::SessionNotFound {
            session_id: SessionId::new("alpha"),
        };
        assert_eq!(err.to_string(), "Session not found: alpha");

        let err = DomainError::InvalidFieldValue {
            field: "session id".to_string(),
            value: "a b".to_string(),
            expected: "no whitespace".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid session id: a b (expected no whitespace)");
    }
}
