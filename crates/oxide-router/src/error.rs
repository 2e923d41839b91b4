//! Error types for dispatch.

use thiserror::Error;

/// Boxed error carried through the continuation chain.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Router-specific errors.
#[derive(Debug, Error)]
pub enum RouterError {
    /// No layer handled the request.
    #[error("no route matched: {method} {path}")]
    NotFound { method: String, path: String },

    /// Invalid path pattern.
    #[error("invalid path pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A handler, middleware or parameter hook failed.
    #[error("{source}")]
    Handler {
        /// Status code the failure should be rendered with.
        status: u16,
        /// The underlying error.
        source: BoxError,
    },
}

impl RouterError {
    /// Wraps an arbitrary error raised by request-handling code.
    pub fn handler(status: u16, source: impl Into<BoxError>) -> Self {
        Self::Handler {
            status,
            source: source.into(),
        }
    }

    /// Returns the status code this error should be rendered with.
    pub fn status(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::InvalidPattern { .. } => 500,
            Self::Handler { status, .. } => *status,
        }
    }

    /// Returns the wrapped handler error, if any.
    pub fn source_ref(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Handler { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Result type alias for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = RouterError::NotFound {
            method: "GET".to_string(),
            path: "/missing".to_string(),
        };
        assert_eq!(err.status(), 404);

        let err = RouterError::handler(400, "bad id");
        assert_eq!(err.status(), 400);
        assert_eq!(err.to_string(), "bad id");
        assert!(err.source_ref().is_some());
    }
}
