//! Durable Proxy SDK for Rust
//!
//! This SDK lets Rust applications host and start durable workflows and
//! activities by talking to a local proxy process over one binary
//! request/reply channel. Many logical clients, each with its own
//! namespace, defaults and registrations, share that channel.
//!
//! ```ignore
//! let registry = ClientRegistry::connect_tcp("127.0.0.1:5000", TransportConfig::DEFAULT).await?;
//! let client = ProxyClientBuilder::new()
//!     .namespace("default")
//!     .task_queue("q1")
//!     .register_workflow(Greeter)
//!     .build(&registry)
//!     .await?;
//! let worker = client.new_worker(None, None, WorkerKind::Both).await?;
//! client.start_worker(&worker).await?;
//! let greeting = client
//!     .execute_workflow::<Greeter>("Jeff".into(), StartWorkflowOptions::default())
//!     .await?;
//! ```

#![allow(clippy::result_large_err)]

pub mod activity;
pub mod client;
pub mod common;
pub mod config;
pub mod error;
pub mod options;
pub mod transport;
pub mod worker;
pub mod workflow;

// Re-export commonly used types
pub use error::{DeterminismViolationError, ErrorKind, Result, SdkError};

// Re-export config types
pub use config::{ClientSettings, ConfigError, TransportConfig};

// Re-export client types
pub use client::{
    ClientHook, ClientRegistry, CompositeHook, LoggingHook, NamespaceOptions, NamespacePage,
    NoOpHook, ProxyClient, ProxyClientBuilder, WorkflowExecution,
};

// Re-export transport types
pub use transport::{CancelSignal, InboundHandler, ProxyTransport};

// Re-export options types
pub use options::{
    ActivityAttributes, ActivityOptions, ActivityTarget, ChildWorkflowOptions,
    EffectiveActivityOptions, EffectiveChildOptions, EffectiveStartOptions, OptionsResolver,
    ParentInfo, StartWorkflowOptions, WorkflowAttributes, WorkflowTarget,
};

// Re-export workflow types
pub use workflow::{WorkflowContext, WorkflowContextExt, WorkflowDefinition, WorkflowInfo};

// Re-export activity types
pub use activity::{ActivityContext, ActivityContextExt, ActivityDefinition, ActivityInfo};

// Re-export worker types
pub use worker::{
    ActivityRegistry, DisposeOutcome, WorkerHandle, WorkerKey, WorkerPool, WorkflowMetadata,
    WorkflowRegistration, WorkflowRegistry,
};

// Re-export protocol types from core
pub use durable_proxy_core::{
    MarkerKind, MessageCodec, MessageType, ProxyError, ProxyErrorKind, ProxyMessage, ReplayMarker,
    WorkerKind, WorkflowIdReusePolicy,
};
pub use durable_proxy_core::protocol::messages::{
    NamespaceInfo, PollerInfo, WorkflowExecutionDescription, WorkflowExecutionStatus,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::activity::{ActivityContext, ActivityContextExt, ActivityDefinition};
    pub use crate::client::{
        ClientHook, ClientRegistry, LoggingHook, NoOpHook, ProxyClient, ProxyClientBuilder,
        WorkflowExecution,
    };
    pub use crate::config::{ClientSettings, TransportConfig};
    pub use crate::error::{Result, SdkError};
    pub use crate::options::{
        ActivityAttributes, ActivityOptions, ChildWorkflowOptions, StartWorkflowOptions,
        WorkflowAttributes,
    };
    pub use crate::worker::{DisposeOutcome, WorkerHandle, WorkflowRegistration};
    pub use crate::workflow::{WorkflowContext, WorkflowContextExt, WorkflowDefinition};
    pub use async_trait::async_trait;
    pub use durable_proxy_core::{WorkerKind, WorkflowIdReusePolicy};
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{json, Value};
}
