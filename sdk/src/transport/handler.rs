//! Inbound handlers and cooperative cancellation

use crate::error::Result;
use async_trait::async_trait;
use durable_proxy_core::ProxyMessage;
use std::sync::Arc;
use tokio::sync::watch;

/// Handles one kind of request initiated by the proxy.
///
/// The returned message becomes the reply; the transport copies the
/// request's `ClientId` and `RequestId` onto it. An error is sent back as
/// the reply's `Error` property instead.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(&self, request: ProxyMessage, cancel: CancelSignal) -> Result<ProxyMessage>;
}

/// A cloneable cancellation flag.
///
/// Tripped when the proxy sends a `CancelRequest` for the invocation it
/// was created for, when an activity's worker is stopping, or when the
/// connection is lost. Work observes it at its next suspension point.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Trip the signal. Returns false if it was already tripped.
    pub fn cancel(&self) -> bool {
        !self.tx.send_replace(true)
    }

    /// Resolves once the signal is tripped
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so `changed` cannot fail here.
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
