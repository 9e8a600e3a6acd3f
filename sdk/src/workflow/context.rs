//! WorkflowContext trait definition

use crate::activity::ActivityDefinition;
use crate::error::{Result, SdkError};
use crate::options::{ActivityOptions, ActivityTarget, ChildWorkflowOptions, WorkflowTarget};
use crate::workflow::definition::WorkflowDefinition;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Answers a query from the current workflow state
pub type QueryHandlerFn = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// Produces the value of a side effect. Never called on replay.
pub type SideEffectFn = Box<dyn FnOnce() -> Result<Value> + Send>;

/// Context for workflow execution providing deterministic APIs.
///
/// Every non-deterministic value (side effects, versions, random numbers,
/// UUIDs, the clock and timers) goes through the replay log: the first
/// execution records it, later executions of the same workflow get the
/// recorded value back.
///
/// This trait uses `Value` types for object-safety. For typed APIs, use the
/// extension methods provided by [`WorkflowContextExt`].
#[async_trait]
pub trait WorkflowContext: Send + Sync {
    // === Identifiers ===

    /// Id of the client this execution was delivered to
    fn client_id(&self) -> u32;

    /// Proxy-assigned handle of this execution
    fn context_id(&self) -> i64;

    fn workflow_type(&self) -> &str;
    fn workflow_id(&self) -> &str;
    fn run_id(&self) -> &str;
    fn namespace(&self) -> &str;
    fn task_queue(&self) -> &str;

    // === Replay ===

    /// True while the execution is consuming recorded history
    fn is_replaying(&self) -> bool;

    /// Run `producer` once and record its value; on replay return the
    /// recorded value without calling it
    async fn side_effect_raw(&self, producer: SideEffectFn) -> Result<Value>;

    /// Pick the code path for `change_id`. New executions get
    /// `max_supported`; replays get the recorded version, which must lie in
    /// `[min_supported, max_supported]`.
    async fn get_version(&self, change_id: &str, min_supported: i32, max_supported: i32)
        -> Result<i32>;

    /// A random number in `[0, 1)`, stable across replays
    async fn random(&self) -> Result<f64>;

    /// A random UUID, stable across replays
    async fn new_uuid(&self) -> Result<Uuid>;

    /// Workflow time as reported by the proxy, stable across replays
    async fn now(&self) -> Result<DateTime<Utc>>;

    /// Durable timer. A replayed timer that already fired returns immediately.
    async fn sleep(&self, duration: Duration) -> Result<()>;

    // === Activities and child workflows ===

    async fn execute_activity_raw(
        &self,
        target: ActivityTarget,
        args: Value,
        options: ActivityOptions,
    ) -> Result<Value>;

    /// Run an activity in this worker process without a server round trip
    async fn execute_local_activity_raw(
        &self,
        target: ActivityTarget,
        args: Value,
        options: ActivityOptions,
    ) -> Result<Value>;

    async fn execute_child_workflow_raw(
        &self,
        target: WorkflowTarget,
        args: Value,
        options: ChildWorkflowOptions,
    ) -> Result<Value>;

    // === Signals and queries ===

    /// Wait for the next delivery of `signal_name`
    async fn wait_for_signal_raw(&self, signal_name: &str) -> Result<Value>;

    /// Install the handler that answers `query_name`
    fn set_query_handler_raw(&self, query_name: &str, handler: QueryHandlerFn) -> Result<()>;

    // === Cancellation ===

    fn is_cancellation_requested(&self) -> bool;

    /// Return `SdkError::Cancelled` if cancellation has been requested
    async fn check_cancellation(&self) -> Result<()>;
}

/// Extension trait for typed workflow context operations.
/// These methods provide type-safe wrappers around the raw Value methods.
pub trait WorkflowContextExt: WorkflowContext {
    /// Typed [`WorkflowContext::side_effect_raw`]
    fn side_effect<T, F>(&self, producer: F) -> impl std::future::Future<Output = Result<T>> + Send
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> T + Send + 'static,
        Self: Sync,
    {
        async move {
            let value = self
                .side_effect_raw(Box::new(move || {
                    serde_json::to_value(producer()).map_err(SdkError::Serialization)
                }))
                .await?;
            serde_json::from_value(value).map_err(SdkError::Serialization)
        }
    }

    /// Run activity `A` and wait for its result
    fn execute_activity<A>(
        &self,
        input: A::Input,
        options: ActivityOptions,
    ) -> impl std::future::Future<Output = Result<A::Output>> + Send
    where
        A: ActivityDefinition,
        Self: Sync,
    {
        async move {
            let args = serde_json::to_value(input).map_err(SdkError::Serialization)?;
            let value = self
                .execute_activity_raw(ActivityTarget::of::<A>(), args, options)
                .await?;
            serde_json::from_value(value).map_err(SdkError::Serialization)
        }
    }

    /// Run activity `A` as a local activity
    fn execute_local_activity<A>(
        &self,
        input: A::Input,
        options: ActivityOptions,
    ) -> impl std::future::Future<Output = Result<A::Output>> + Send
    where
        A: ActivityDefinition,
        Self: Sync,
    {
        async move {
            let args = serde_json::to_value(input).map_err(SdkError::Serialization)?;
            let value = self
                .execute_local_activity_raw(ActivityTarget::of::<A>(), args, options)
                .await?;
            serde_json::from_value(value).map_err(SdkError::Serialization)
        }
    }

    /// Run child workflow `W` and wait for its result
    fn execute_child_workflow<W>(
        &self,
        input: W::Input,
        options: ChildWorkflowOptions,
    ) -> impl std::future::Future<Output = Result<W::Output>> + Send
    where
        W: WorkflowDefinition,
        Self: Sync,
    {
        async move {
            let args = serde_json::to_value(input).map_err(SdkError::Serialization)?;
            let value = self
                .execute_child_workflow_raw(WorkflowTarget::of::<W>(), args, options)
                .await?;
            serde_json::from_value(value).map_err(SdkError::Serialization)
        }
    }

    /// Typed [`WorkflowContext::wait_for_signal_raw`]
    fn wait_for_signal<T: DeserializeOwned>(
        &self,
        signal_name: &str,
    ) -> impl std::future::Future<Output = Result<T>> + Send
    where
        Self: Sync,
    {
        async move {
            let value = self.wait_for_signal_raw(signal_name).await?;
            serde_json::from_value(value).map_err(SdkError::Serialization)
        }
    }

    /// Typed [`WorkflowContext::set_query_handler_raw`]
    fn set_query_handler<A, R, F>(&self, query_name: &str, handler: F) -> Result<()>
    where
        A: DeserializeOwned,
        R: Serialize,
        F: Fn(A) -> Result<R> + Send + Sync + 'static,
    {
        self.set_query_handler_raw(
            query_name,
            Arc::new(move |args| {
                let args = serde_json::from_value(args).map_err(SdkError::Serialization)?;
                serde_json::to_value(handler(args)?).map_err(SdkError::Serialization)
            }),
        )
    }
}

// Implement WorkflowContextExt for all types that implement WorkflowContext
impl<T: WorkflowContext + ?Sized> WorkflowContextExt for T {}
