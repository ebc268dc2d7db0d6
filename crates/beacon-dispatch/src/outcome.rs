//! Classification of a single dispatch attempt.

use crate::error::{DispatchError, ErrorCategory, Result};

/// How the endpoint's status code is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// Status in `200..300`.
    Success,
    /// Any other status.
    ProtocolError {
        /// Status code received
        status_code: u16,
    },
}

/// Classifies an HTTP status code.
pub fn classify_status(status_code: u16) -> ResponseClass {
    if (200..300).contains(&status_code) {
        ResponseClass::Success
    } else {
        ResponseClass::ProtocolError { status_code }
    }
}

/// Result of one worker iteration.
///
/// Workers record the outcome and move on regardless of which variant they
/// get; none of them ends the worker loop.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// Endpoint accepted the event.
    Success {
        /// Status code received
        status_code: u16,
    },
    /// Endpoint answered with a non-success status.
    ProtocolError {
        /// Status code received
        status_code: u16,
    },
    /// Request could not be built or executed.
    TransportError(DispatchError),
}

impl DispatchOutcome {
    /// Builds the outcome for a transport result.
    pub fn from_response(response: Result<u16>) -> Self {
        match response {
            Ok(status_code) => match classify_status(status_code) {
                ResponseClass::Success => Self::Success { status_code },
                ResponseClass::ProtocolError { status_code } => Self::ProtocolError { status_code },
            },
            Err(error) => Self::TransportError(error),
        }
    }

    /// Whether the event was delivered.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Error to record for a failed outcome.
    pub fn error(&self) -> Option<DispatchError> {
        match self {
            Self::Success { .. } => None,
            Self::ProtocolError { status_code } => {
                Some(DispatchError::unexpected_status(*status_code))
            },
            Self::TransportError(error) => Some(error.clone()),
        }
    }

    /// Error category of a failed outcome.
    pub fn category(&self) -> Option<ErrorCategory> {
        self.error().map(|error| error.category())
    }
}
