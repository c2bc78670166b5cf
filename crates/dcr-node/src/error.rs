//! Error types for dcr-node
//!
//! [`EventError`] is the taxonomy callers see. Storage and gateway errors
//! are folded into it at the protocol boundaries.

use thiserror::Error;

/// Storage-specific errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict (e.g., already exists)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query error
    #[error("Query error: {0}")]
    Query(String),
}

/// Errors raised by a remote node call
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Connection refused, DNS failure, timeout
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote node answered with a non-2xx status
    #[error("Remote node returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Transport failures and 5xx answers may succeed on another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Transport(_) => true,
            GatewayError::Status { status, .. } => *status >= 500,
            GatewayError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

/// Errors surfaced by the event node operations
#[derive(Debug, Error)]
pub enum EventError {
    /// Malformed or missing input
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// Unknown workflow or event
    #[error("Not found: {0}")]
    NotFound(String),

    /// Lock held by another party
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Caller roles do not intersect the event's roles
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Condition preconditions are not met
    #[error("Not executable: {0}")]
    NotExecutable(String),

    /// LockAll could not lock every dependent
    #[error("Failed to lock other event: {0}")]
    FailedToLockOtherEvent(String),

    /// UnlockAll could not unlock every dependent
    #[error("Failed to unlock other event: {0}")]
    FailedToUnlockOtherEvent(String),

    /// Local persistence write failed during execution
    #[error("Failed to update state: {0}")]
    FailedToUpdateState(String),

    /// A propagation call to a related event failed
    #[error("Failed to update state at other event: {0}")]
    FailedToUpdateStateAtOtherEvent(String),

    /// Storage failure outside the execution critical section
    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl EventError {
    /// HTTP status a caller sees for this error
    pub fn http_status(&self) -> u16 {
        match self {
            EventError::Argument(_) => 400,
            EventError::Unauthorized(_) => 401,
            EventError::NotFound(_) => 404,
            EventError::Conflict(_) => 409,
            EventError::NotExecutable(_) => 412,
            EventError::FailedToLockOtherEvent(_)
            | EventError::FailedToUnlockOtherEvent(_)
            | EventError::FailedToUpdateState(_)
            | EventError::FailedToUpdateStateAtOtherEvent(_)
            | EventError::Storage(_) => 500,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            EventError::Argument(_) => "BAD_REQUEST",
            EventError::Unauthorized(_) => "UNAUTHORIZED",
            EventError::NotFound(_) => "NOT_FOUND",
            EventError::Conflict(_) => "LOCKED",
            EventError::NotExecutable(_) => "NOT_EXECUTABLE",
            EventError::FailedToLockOtherEvent(_) => "FAILED_TO_LOCK_OTHER_EVENT",
            EventError::FailedToUnlockOtherEvent(_) => "FAILED_TO_UNLOCK_OTHER_EVENT",
            EventError::FailedToUpdateState(_) => "FAILED_TO_UPDATE_STATE",
            EventError::FailedToUpdateStateAtOtherEvent(_) => {
                "FAILED_TO_UPDATE_STATE_AT_OTHER_EVENT"
            }
            EventError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<StorageError> for EventError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => EventError::NotFound(what),
            StorageError::Conflict(what) => EventError::Conflict(what),
            other => EventError::Storage(other),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for remote node calls
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Result type for event node operations
pub type EventResult<T> = Result<T, EventError>;
