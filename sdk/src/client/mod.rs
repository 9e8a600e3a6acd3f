//! Logical clients multiplexed over one proxy transport

pub mod builder;
pub mod hook;
pub mod namespace;
pub mod proxy_client;
pub mod registry;

pub(crate) use proxy_client::ClientShared;

pub use builder::ProxyClientBuilder;
pub use hook::{ClientHook, CompositeHook, LogLevel, LoggingHook, NoOpHook};
pub use namespace::{NamespaceOptions, NamespacePage};
pub use proxy_client::{ProxyClient, WorkflowExecution};
pub use registry::{ClientRegistry, LIBRARY_NAME};
