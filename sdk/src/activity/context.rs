//! ActivityContext trait and its proxy-backed implementation

use crate::error::{Result, SdkError};
use crate::transport::{CancelSignal, ProxyTransport};
use crate::common::payload;
use async_trait::async_trait;
use durable_proxy_core::protocol::messages::{
    ActivityGetHeartbeatDetailsRequest, ActivityHasHeartbeatDetailsRequest,
    ActivityRecordHeartbeatRequest,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};

/// Context for activity execution
#[async_trait]
pub trait ActivityContext: Send + Sync {
    /// Id of the client this activity was delivered to
    fn client_id(&self) -> u32;

    /// Proxy-assigned handle of this activity execution
    fn context_id(&self) -> i64;

    fn activity_type(&self) -> &str;
    fn activity_id(&self) -> &str;
    fn namespace(&self) -> &str;
    fn task_queue(&self) -> &str;

    /// Opaque token identifying this attempt to the server. Empty for
    /// local activities.
    fn task_token(&self) -> &[u8];

    /// True when run as a local activity of a workflow on this worker
    fn is_local(&self) -> bool;

    /// Report liveness to the server, with optional progress details
    async fn heartbeat_raw(&self, details: Option<Value>) -> Result<()>;

    /// Details recorded by the last heartbeat of a previous attempt
    async fn heartbeat_details_raw(&self) -> Result<Option<Value>>;

    /// Whether a previous attempt left heartbeat details
    async fn has_heartbeat_details(&self) -> Result<bool>;

    /// Leave the activity running after the function returns. Its result
    /// is supplied later through [`ProxyClient::complete_activity`] with
    /// [`ActivityContext::task_token`], and the value the function returns
    /// is discarded.
    ///
    /// [`ProxyClient::complete_activity`]: crate::client::ProxyClient::complete_activity
    fn defer_completion(&self) -> Result<()>;

    /// True once the activity was cancelled or its worker is stopping
    fn is_cancelled(&self) -> bool;

    /// Return `SdkError::Cancelled` if cancellation has been requested
    async fn check_cancellation(&self) -> Result<()>;

    /// Resolves once cancellation is requested
    async fn cancelled(&self);
}

/// Extension trait for typed activity context operations
pub trait ActivityContextExt: ActivityContext {
    fn heartbeat<T: Serialize>(
        &self,
        details: &T,
    ) -> impl std::future::Future<Output = Result<()>> + Send
    where
        Self: Sync,
    {
        let details = serde_json::to_value(details).map_err(SdkError::Serialization);
        async move { self.heartbeat_raw(Some(details?)).await }
    }

    /// Typed [`ActivityContext::heartbeat_details_raw`]
    fn heartbeat_details<T: DeserializeOwned>(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<T>>> + Send
    where
        Self: Sync,
    {
        async move {
            match self.heartbeat_details_raw().await? {
                Some(details) => Ok(Some(serde_json::from_value(details)?)),
                None => Ok(None),
            }
        }
    }
}

impl<T: ActivityContext + ?Sized> ActivityContextExt for T {}

/// Identifiers of one activity execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityInfo {
    pub context_id: i64,
    pub activity_type: String,
    pub activity_id: String,
    pub namespace: String,
    pub task_queue: String,
    pub task_token: Vec<u8>,
    pub local: bool,
}

/// Proxy-backed [`ActivityContext`]
pub struct ActivityContextImpl {
    transport: ProxyTransport,
    client_id: u32,
    info: ActivityInfo,
    cancel: CancelSignal,
    deferred: AtomicBool,
}

impl ActivityContextImpl {
    pub fn new(
        transport: ProxyTransport,
        client_id: u32,
        info: ActivityInfo,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            transport,
            client_id,
            info,
            cancel,
            deferred: AtomicBool::new(false),
        }
    }

    pub fn info(&self) -> &ActivityInfo {
        &self.info
    }

    /// Whether the function asked for its result to be supplied later
    pub fn completion_deferred(&self) -> bool {
        self.deferred.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActivityContext for ActivityContextImpl {
    fn client_id(&self) -> u32 {
        self.client_id
    }

    fn context_id(&self) -> i64 {
        self.info.context_id
    }

    fn activity_type(&self) -> &str {
        &self.info.activity_type
    }

    fn activity_id(&self) -> &str {
        &self.info.activity_id
    }

    fn namespace(&self) -> &str {
        &self.info.namespace
    }

    fn task_queue(&self) -> &str {
        &self.info.task_queue
    }

    fn task_token(&self) -> &[u8] {
        &self.info.task_token
    }

    fn is_local(&self) -> bool {
        self.info.local
    }

    async fn heartbeat_raw(&self, details: Option<Value>) -> Result<()> {
        let details = details.map(|d| serde_json::to_vec(&d)).transpose()?;
        self.transport
            .call(ActivityRecordHeartbeatRequest {
                client_id: self.client_id,
                context_id: Some(self.info.context_id),
                details,
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    async fn heartbeat_details_raw(&self) -> Result<Option<Value>> {
        let reply = self
            .transport
            .call(ActivityGetHeartbeatDetailsRequest {
                client_id: self.client_id,
                context_id: Some(self.info.context_id),
                ..Default::default()
            })
            .await?;
        match reply.details.filter(|bytes| !bytes.is_empty()) {
            Some(bytes) => Ok(Some(payload::decode(Some(bytes))?)),
            None => Ok(None),
        }
    }

    async fn has_heartbeat_details(&self) -> Result<bool> {
        let reply = self
            .transport
            .call(ActivityHasHeartbeatDetailsRequest {
                client_id: self.client_id,
                context_id: Some(self.info.context_id),
                ..Default::default()
            })
            .await?;
        Ok(reply.has_details.unwrap_or(false))
    }

    fn defer_completion(&self) -> Result<()> {
        if self.info.local || self.info.task_token.is_empty() {
            return Err(SdkError::InvalidOperation(format!(
                "activity '{}' ({}) has no task token to complete with",
                self.info.activity_type, self.info.activity_id
            )));
        }
        self.deferred.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn check_cancellation(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(SdkError::Cancelled(format!(
                "activity '{}' ({})",
                self.info.activity_type, self.info.activity_id
            )));
        }
        Ok(())
    }

    async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

impl std::fmt::Debug for ActivityContextImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityContextImpl")
            .field("client_id", &self.client_id)
            .field("info", &self.info)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("deferred", &self.completion_deferred())
            .finish()
    }
}
