//! # Durable Proxy Core
//!
//! Language-agnostic building blocks for SDKs that drive a durable
//! workflow orchestration server through a local proxy process.
//!
//! ## What's in Core vs SDK
//!
//! **Core** contains the parts every language binding shares:
//! - Message types and their static request/reply pairing
//! - The typed property bag and the binary frame codec
//! - Typed request/reply structs
//! - Worker kinds and workflow id reuse policies
//! - The replay log behind deterministic side effects
//!
//! **SDK** contains the async runtime:
//! - Transport with request correlation and heartbeats
//! - Client registry, worker pool and options resolution
//! - Workflow and activity contexts and dispatch
//!
//! ## Modules
//!
//! - [`protocol`] - Wire format, message catalogue, proxy errors
//! - [`worker`] - Worker kinds
//! - [`workflow`] - Replay state and workflow-level enums
//! - [`error`] - Core error types
//! - `testing` - One populated sample per message type (feature `testing`)

pub mod error;
pub mod protocol;
pub mod worker;
pub mod workflow;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export error types
pub use error::{CoreError, CoreResult, DeterminismViolationError};

// Re-export protocol types
pub use protocol::{
    MessageCodec, MessageType, PropertyValue, ProxyError, ProxyErrorKind, ProxyMessage,
    ProxyReply, ProxyRequest, TypedMessage,
};

// Re-export worker and workflow types
pub use worker::WorkerKind;
pub use workflow::{MarkerKind, ReplayMarker, ReplayState, WorkflowIdReusePolicy};
