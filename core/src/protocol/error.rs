//! Error payload carried by reply messages

use serde::{Deserialize, Serialize};
use std::fmt;

/// Origin class of an error reported by the proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyErrorKind {
    /// The operation was cancelled before it completed
    Cancelled,
    /// Application-defined failure raised by workflow or activity code
    Custom,
    /// Any other server or proxy failure
    Generic,
    /// The proxy or the user code panicked
    Panic,
    /// The workflow was terminated
    Terminated,
    /// A timeout expired
    Timeout,
}

/// The `Error` property of a reply: a kind plus the original message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyError {
    pub kind: ProxyErrorKind,
    pub message: String,
}

impl ProxyError {
    pub fn new(kind: ProxyErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(ProxyErrorKind::Generic, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ProxyErrorKind::Cancelled, message)
    }
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ProxyError {}

crate::json_property_field!(ProxyError);
