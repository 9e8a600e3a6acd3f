//! Core error types shared by every durable-proxy SDK
//!
//! Language bindings wrap these in their own error enums; nothing here
//! knows about transports or async runtimes.

use crate::protocol::MessageType;
use crate::workflow::MarkerKind;

/// Errors raised while encoding, decoding or interpreting proxy messages
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The bytes on the wire do not form a valid message
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// A well-formed message arrived where a different type was expected
    #[error("Unexpected message type: expected {expected:?}, got {actual:?}")]
    UnexpectedMessageType {
        expected: MessageType,
        actual: MessageType,
    },

    /// A value cannot be represented on the wire
    #[error("Cannot encode message: {0}")]
    Encode(String),

    /// JSON property or marker payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Replay diverged from recorded history
    #[error("Determinism violation: {0}")]
    DeterminismViolation(#[from] DeterminismViolationError),
}

impl CoreError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        CoreError::MalformedMessage(reason.into())
    }

    /// True for every failure that means "the peer sent bytes we cannot use"
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            CoreError::MalformedMessage(_) | CoreError::UnexpectedMessageType { .. }
        )
    }
}

/// Result type alias for core operations
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Ways a replayed workflow can diverge from the markers recorded by its
/// first execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeterminismViolationError {
    /// The primitive called at this sequence differs from the recorded one
    KindMismatch {
        sequence: u32,
        expected: MarkerKind,
        actual: MarkerKind,
    },

    /// A version marker was recorded for a different change id
    ChangeIdMismatch {
        sequence: u32,
        expected: String,
        actual: String,
    },

    /// The recorded version no longer falls inside the supported range
    VersionOutOfRange {
        change_id: String,
        version: i32,
        min_supported: i32,
        max_supported: i32,
    },

    /// The recorded value cannot be read back as the requested type
    CorruptMarker { sequence: u32, reason: String },
}

impl std::fmt::Display for DeterminismViolationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KindMismatch {
                sequence,
                expected,
                actual,
            } => write!(
                f,
                "Marker kind mismatch at sequence {}: expected {:?}, got {:?}",
                sequence, expected, actual
            ),
            Self::ChangeIdMismatch {
                sequence,
                expected,
                actual,
            } => write!(
                f,
                "Change id mismatch at sequence {}: expected '{}', got '{}'",
                sequence, expected, actual
            ),
            Self::VersionOutOfRange {
                change_id,
                version,
                min_supported,
                max_supported,
            } => write!(
                f,
                "Recorded version {} of change '{}' is outside the supported range [{}, {}]",
                version, change_id, min_supported, max_supported
            ),
            Self::CorruptMarker { sequence, reason } => {
                write!(f, "Corrupt marker at sequence {}: {}", sequence, reason)
            }
        }
    }
}

impl std::error::Error for DeterminismViolationError {}
