//! Error types for the durable-proxy SDK

// Re-export core error types
pub use durable_proxy_core::{CoreError, DeterminismViolationError, ProxyError, ProxyErrorKind};

use crate::config::ConfigError;

/// Main error type for the SDK
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    /// Bytes from the proxy could not be decoded
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// A reply arrived for a request id nobody is waiting on
    #[error("No pending request with id {0}")]
    UnknownCorrelation(u32),

    /// The proxy connection is gone; the client must reconnect
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Conflicting workflow, activity, signal or query registration
    #[error("Duplicate registration: {0}")]
    DuplicateRegistration(String),

    /// Illegal state transition (restarting a worker, reusing a disposed handle...)
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// No precedence tier supplied a task queue
    #[error("No task queue resolved for {0}")]
    MissingTaskQueue(String),

    /// The proxy or the server reported a failure
    #[error("Remote fault ({kind:?}): {message}")]
    RemoteFault {
        kind: ProxyErrorKind,
        message: String,
    },

    /// The operation was cancelled locally
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A reply did not arrive in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Replay diverged from recorded history
    #[error("Determinism violation: {0}")]
    DeterminismViolation(DeterminismViolationError),

    /// No workflow, activity, client or execution under that name
    #[error("Not registered: {0}")]
    NotRegistered(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The taxonomy bucket of an [`SdkError`], for callers that only need to
/// branch on the kind of failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedMessage,
    UnknownCorrelation,
    ConnectionLost,
    DuplicateRegistration,
    InvalidOperation,
    MissingTaskQueue,
    RemoteFault,
    Cancelled,
    Timeout,
    DeterminismViolation,
    NotRegistered,
    InvalidConfiguration,
    Serialization,
    Io,
}

impl SdkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SdkError::MalformedMessage(_) => ErrorKind::MalformedMessage,
            SdkError::UnknownCorrelation(_) => ErrorKind::UnknownCorrelation,
            SdkError::ConnectionLost(_) => ErrorKind::ConnectionLost,
            SdkError::DuplicateRegistration(_) => ErrorKind::DuplicateRegistration,
            SdkError::InvalidOperation(_) => ErrorKind::InvalidOperation,
            SdkError::MissingTaskQueue(_) => ErrorKind::MissingTaskQueue,
            SdkError::RemoteFault { .. } => ErrorKind::RemoteFault,
            SdkError::Cancelled(_) => ErrorKind::Cancelled,
            SdkError::Timeout(_) => ErrorKind::Timeout,
            SdkError::DeterminismViolation(_) => ErrorKind::DeterminismViolation,
            SdkError::NotRegistered(_) => ErrorKind::NotRegistered,
            SdkError::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            SdkError::Serialization(_) => ErrorKind::Serialization,
            SdkError::Io(_) => ErrorKind::Io,
        }
    }

    /// The error to put in the reply when an inbound invocation fails
    pub fn to_proxy_error(&self) -> ProxyError {
        match self {
            SdkError::RemoteFault { kind, message } => ProxyError::new(*kind, message.clone()),
            SdkError::Cancelled(message) => ProxyError::cancelled(message.clone()),
            SdkError::Timeout(message) => ProxyError::new(ProxyErrorKind::Timeout, message.clone()),
            other => ProxyError::new(ProxyErrorKind::Custom, other.to_string()),
        }
    }
}

/// Result type alias for SDK operations
pub type Result<T> = std::result::Result<T, SdkError>;

impl From<CoreError> for SdkError {
    fn from(err: CoreError) -> Self {
        match err {
            e @ (CoreError::MalformedMessage(_) | CoreError::UnexpectedMessageType { .. }) => {
                SdkError::MalformedMessage(e.to_string())
            }
            CoreError::Encode(msg) => SdkError::InvalidOperation(msg),
            CoreError::Serialization(e) => SdkError::Serialization(e),
            CoreError::DeterminismViolation(e) => SdkError::DeterminismViolation(e),
        }
    }
}

impl From<ProxyError> for SdkError {
    fn from(err: ProxyError) -> Self {
        SdkError::RemoteFault {
            kind: err.kind,
            message: err.message,
        }
    }
}

impl From<DeterminismViolationError> for SdkError {
    fn from(err: DeterminismViolationError) -> Self {
        SdkError::DeterminismViolation(err)
    }
}

impl From<ConfigError> for SdkError {
    fn from(err: ConfigError) -> Self {
        SdkError::InvalidConfiguration(err.to_string())
    }
}
