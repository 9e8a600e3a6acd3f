//! The byte channel to the proxy process
//!
//! - [`ProxyTransport`] - request/reply correlation, heartbeats, inbound dispatch
//! - [`InboundHandler`] - hook for requests initiated by the proxy
//! - [`CancelSignal`] - cancellation flag handed to inbound handlers

mod connection;
mod handler;
mod log;

pub use connection::ProxyTransport;
pub use handler::{CancelSignal, InboundHandler};
