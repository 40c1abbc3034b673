//! Error types for stash.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Boundary errors
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    // Archive errors
    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Archive stream closed by consumer")]
    StreamClosed,

    // Store errors
    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    // Infrastructure errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error only reports that the other side of an operation
    /// went away first.
    pub fn is_secondary(&self) -> bool {
        matches!(self, Error::StreamClosed)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_converts() {
        let err: Error = std::io::Error::other("disk full").into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.to_string(), "IO error: disk full");
    }

    #[test]
    fn test_classification() {
        assert!(Error::StreamClosed.is_secondary());
        assert!(!Error::Transfer("boom".into()).is_secondary());
        assert!(Error::NotFound("k".into()).is_not_found());
    }
}
