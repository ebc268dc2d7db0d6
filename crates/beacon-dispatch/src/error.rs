//! Error types for event dispatch operations.
//!
//! Only construction errors are ever returned to a caller. Everything raised
//! while a worker builds or executes a request is contained at the worker's
//! iteration boundary and recorded through `tracing`, so these variants mostly
//! travel inside [`DispatchOutcome`](crate::outcome::DispatchOutcome) values
//! and log fields.

use std::fmt;

use thiserror::Error;

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Every failure the dispatch engine can observe.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// Queue capacity was not positive.
    #[error("queue capacity must be > 0, got {capacity}")]
    InvalidQueueCapacity {
        /// Rejected capacity value
        capacity: usize,
    },

    /// Engine or transport configuration could not be applied.
    #[error("invalid dispatch configuration: {message}")]
    ConfigurationError {
        /// Configuration error message
        message: String,
    },

    /// Queue was at capacity when the event was offered.
    #[error("unable to enqueue event because queue is full (capacity {capacity})")]
    QueueFull {
        /// Capacity of the full queue
        capacity: usize,
    },

    /// Engine has been shut down and no longer accepts events.
    #[error("dispatch engine is shut down")]
    ShutDown,

    /// Event endpoint could not be turned into a request URI.
    #[error("invalid event endpoint {url:?}: {message}")]
    InvalidEndpoint {
        /// Endpoint exactly as supplied by the event
        url: String,
        /// Parse or validation failure
        message: String,
    },

    /// Endpoint answered with a status outside `200..300`.
    #[error("unexpected response from event endpoint, status: {status_code}")]
    UnexpectedStatus {
        /// HTTP status code received
        status_code: u16,
    },

    /// Network-level failure while sending the request.
    #[error("network connection failed: {message}")]
    NetworkError {
        /// Error message describing the network failure
        message: String,
    },

    /// Request exceeded the configured timeout.
    #[error("request timeout after {timeout_ms}ms")]
    Timeout {
        /// Configured request timeout in milliseconds
        timeout_ms: u64,
    },

    /// Transport refused the request because it has been closed.
    #[error("transport is closed")]
    TransportClosed,

    /// A dispatch panicked and was contained by the worker.
    #[error("event dispatch panicked: {message}")]
    Panicked {
        /// Panic payload, when it was a string
        message: String,
    },

    /// Transport failed to close cleanly during shutdown.
    #[error("unable to close transport cleanly: {message}")]
    CloseError {
        /// Close failure message
        message: String,
    },
}

impl DispatchError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    /// Creates an invalid endpoint error.
    pub fn invalid_endpoint(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEndpoint { url: url.into(), message: message.into() }
    }

    /// Creates a protocol error for a non-success status.
    pub fn unexpected_status(status_code: u16) -> Self {
        Self::UnexpectedStatus { status_code }
    }

    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    /// Creates a contained-panic error.
    pub fn panicked(message: impl Into<String>) -> Self {
        Self::Panicked { message: message.into() }
    }

    /// Creates a transport close error.
    pub fn close(message: impl Into<String>) -> Self {
        Self::CloseError { message: message.into() }
    }

    /// Returns the taxonomy category of this error.
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from(self)
    }

    /// Whether the error may fail a caller synchronously.
    ///
    /// Construction errors are the only ones that escape the engine's public
    /// surface; everything else is recorded and swallowed.
    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::Construction
    }
}

/// Category of dispatch error for logging and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Engine could not be created.
    Construction,
    /// Event was dropped before reaching the queue.
    Overflow,
    /// Endpoint returned a non-success status.
    Protocol,
    /// Request could not be built or executed.
    Transport,
    /// Resource release failed during shutdown.
    Shutdown,
}

impl From<&DispatchError> for ErrorCategory {
    fn from(error: &DispatchError) -> Self {
        match error {
            DispatchError::InvalidQueueCapacity { .. }
            | DispatchError::ConfigurationError { .. } => Self::Construction,
            DispatchError::QueueFull { .. } | DispatchError::ShutDown => Self::Overflow,
            DispatchError::UnexpectedStatus { .. } => Self::Protocol,
            DispatchError::InvalidEndpoint { .. }
            | DispatchError::NetworkError { .. }
            | DispatchError::Timeout { .. }
            | DispatchError::TransportClosed
            | DispatchError::Panicked { .. } => Self::Transport,
            DispatchError::CloseError { .. } => Self::Shutdown,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Construction => write!(f, "construction"),
            Self::Overflow => write!(f, "overflow"),
            Self::Protocol => write!(f, "protocol"),
            Self::Transport => write!(f, "transport"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}
