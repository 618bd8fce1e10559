//! Error types for KyroBus.
//!
//! All errors in KyroBus are strongly typed using thiserror.
//! None of them are process-terminating: every failure mode of a publish,
//! a subscription or an argument lookup is returned to the immediate caller.

use thiserror::Error;

/// Errors produced while dispatching an event to a topic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("No such topic: {topic}")]
    NoSuchTopic {
        topic: String,
    },

    #[error("Dispatch cancelled")]
    Cancelled,

    #[error("Dispatch deadline exceeded after {timeout_ms}ms")]
    DeadlineExceeded {
        timeout_ms: u64,
    },

    #[error("Subscription to topic '{topic}' is closed")]
    Closed {
        topic: String,
    },

    #[error("Delivery to topic '{topic}' failed: {reason}")]
    DeliveryFailed {
        topic: String,
        reason: String,
    },
}

/// Errors produced while reading event arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("Argument index {index} is out of range (event has {len} arguments)")]
    InvalidArgIndex {
        index: usize,
        len: usize,
    },

    #[error("Encoding argument {index} as '{key}' failed: {message}")]
    Encoding {
        index: usize,
        key: String,
        message: String,
    },

    #[error("Argument {index} could not be converted: {message}")]
    ArgConversion {
        index: usize,
        message: String,
    },
}

/// Top-level error type for KyroBus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl BusError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a dispatch error.
    #[must_use]
    pub const fn is_dispatch(&self) -> bool {
        matches!(self, Self::Dispatch(_))
    }

    /// Returns true if this is an event argument error.
    #[must_use]
    pub const fn is_event(&self) -> bool {
        matches!(self, Self::Event(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if the publish targeted a topic nobody ever subscribed to.
    #[must_use]
    pub const fn is_no_such_topic(&self) -> bool {
        matches!(self, Self::Dispatch(DispatchError::NoSuchTopic { .. }))
    }

    /// Returns true if the dispatch stopped because its context fired.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Self::Dispatch(DispatchError::Cancelled | DispatchError::DeadlineExceeded { .. })
        )
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Dispatch(e) => matches!(
                e,
                DispatchError::DeadlineExceeded { .. } | DispatchError::DeliveryFailed { .. }
            ),
            Self::Event(_) | Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for KyroBus operations.
pub type BusResult<T> = Result<T, BusError>;
