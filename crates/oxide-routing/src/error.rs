//! Error types for route trees and forwarding.

use std::path::PathBuf;

use oxide_router::RouterError;

/// Errors raised while building, mounting or dispatching a route tree.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    /// A route declaration is malformed or contradictory.
    #[error("invalid route configuration: {0}")]
    Config(String),

    /// The operation is not allowed in the node's current lifecycle state.
    #[error("illegal state: {0}")]
    State(String),

    /// A child was attached in a way the tree does not allow.
    #[error("invalid route structure: {0}")]
    Structure(String),

    /// A path pattern could not be compiled.
    #[error("invalid pattern '{pattern}': {message}")]
    Pattern {
        /// The pattern source.
        pattern: String,
        /// What is wrong with it.
        message: String,
    },

    /// No route is registered under the name.
    #[error("route not found: {0}")]
    NotFound(String),

    /// A forward targeted a route that cannot handle requests.
    #[error("route '{0}' is not an action and cannot be forwarded to")]
    InvalidTarget(String),

    /// No verb could be chosen for a forward.
    #[error("route '{route}' cannot handle {method}; it declares [{declared}]")]
    VerbMismatch {
        /// Target route name.
        route: String,
        /// The verb that was requested or inherited.
        method: String,
        /// The verbs the target declares.
        declared: String,
    },

    /// A forward would revisit a route already on the chain.
    #[error("forwarding loop detected: {}", .chain.join(" -> "))]
    Loop {
        /// Route names in the order they were visited, ending with the
        /// rejected target.
        chain: Vec<String>,
    },

    /// A path could not be generated.
    #[error("cannot generate path for '{route}': parameter '{param}' {reason} (chain: {chain})")]
    PathGeneration {
        /// Route the path was generated for.
        route: String,
        /// Offending parameter.
        param: String,
        /// Why the parameter was rejected.
        reason: String,
        /// Route names from the root down to `route`.
        chain: String,
    },

    /// A matched request carries a missing or invalid parameter.
    #[error("invalid parameter '{param}' for route '{route}': {reason}")]
    InvalidParameter {
        /// The action that rejected the request.
        route: String,
        /// Offending parameter.
        param: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A route file exists but is not a valid route table.
    #[error("failed to parse route file '{path}': {message}")]
    Parse {
        /// Path to the route file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A route file could not be read.
    #[error("failed to read route file '{path}': {source}")]
    Io {
        /// Path to the route file.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// A user handler panicked.
    #[error("handler for route '{route}' panicked: {message}")]
    HandlerPanicked {
        /// The action whose handler panicked.
        route: String,
        /// Panic payload, when it was a string.
        message: String,
    },

    /// The dispatch layer failed.
    #[error(transparent)]
    Framework(RouterError),
}

impl RoutingError {
    /// Returns the status code a host should render this error with.
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidParameter { .. } => 400,
            Self::NotFound(_) => 404,
            Self::Framework(e) => e.status(),
            _ => 500,
        }
    }
}

impl From<RoutingError> for RouterError {
    fn from(err: RoutingError) -> Self {
        match err {
            RoutingError::Framework(inner) => inner,
            other => Self::handler(other.status(), other),
        }
    }
}

impl From<RouterError> for RoutingError {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::Handler { status, source } => match source.downcast::<Self>() {
                Ok(routing) => *routing,
                Err(source) => Self::Framework(RouterError::Handler { status, source }),
            },
            other => Self::Framework(other),
        }
    }
}

/// Result type for routing operations.
pub type Result<T> = std::result::Result<T, RoutingError>;
