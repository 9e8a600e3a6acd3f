//! WorkflowContextImpl - proxy-backed implementation of WorkflowContext

use crate::client::hook::ClientHook;
use crate::common::payload;
use crate::error::{DeterminismViolationError, Result, SdkError};
use crate::options::{
    ActivityOptions, ActivityTarget, ChildWorkflowOptions, OptionsResolver, ParentInfo,
    WorkflowTarget,
};
use crate::transport::{CancelSignal, ProxyTransport};
use crate::workflow::context::{QueryHandlerFn, SideEffectFn, WorkflowContext};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use durable_proxy_core::protocol::interval;
use durable_proxy_core::protocol::messages::{
    ActivityExecuteLocalRequest, ActivityExecuteRequest, WorkflowExecuteChildRequest,
    WorkflowGetTimeRequest, WorkflowMutableRequest, WorkflowSleepRequest,
};
use durable_proxy_core::{MarkerKind, ProxyRequest, ReplayMarker, ReplayState};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

/// Identifiers of one workflow execution, as delivered by the proxy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowInfo {
    pub context_id: i64,
    pub workflow_type: String,
    pub workflow_id: String,
    pub run_id: String,
    pub namespace: String,
    pub task_queue: String,
}

/// Proxy-backed [`WorkflowContext`].
///
/// Holds the replay state of a single execution. Replay primitives take
/// `decisions` for their whole read-produce-persist step, so markers get
/// sequence numbers in the order the calls were issued even when the
/// workflow polls several futures at once.
pub struct WorkflowContextImpl {
    transport: ProxyTransport,
    client_id: u32,
    info: WorkflowInfo,
    replay: Mutex<ReplayState>,
    decisions: tokio::sync::Mutex<()>,
    resolver: Arc<OptionsResolver>,
    hook: Arc<dyn ClientHook>,
    signals: Mutex<HashMap<String, VecDeque<Value>>>,
    signal_arrived: Notify,
    queries: RwLock<HashMap<String, QueryHandlerFn>>,
    cancel: CancelSignal,
}

impl WorkflowContextImpl {
    pub fn new(
        transport: ProxyTransport,
        client_id: u32,
        info: WorkflowInfo,
        replay: ReplayState,
        resolver: Arc<OptionsResolver>,
        hook: Arc<dyn ClientHook>,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            transport,
            client_id,
            info,
            replay: Mutex::new(replay),
            decisions: tokio::sync::Mutex::new(()),
            resolver,
            hook,
            signals: Mutex::new(HashMap::new()),
            signal_arrived: Notify::new(),
            queries: RwLock::new(HashMap::new()),
            cancel,
        }
    }

    pub fn info(&self) -> &WorkflowInfo {
        &self.info
    }

    /// Whether the proxy asked for this delivery to be a replay
    pub fn replay_requested(&self) -> bool {
        self.replay.lock().replay_requested()
    }

    /// Every marker of this execution: recorded history plus new ones
    pub fn markers(&self) -> Vec<ReplayMarker> {
        self.replay.lock().markers().to_vec()
    }

    /// Queue a signal for [`WorkflowContext::wait_for_signal_raw`]
    pub fn deliver_signal(&self, signal_name: &str, args: Value) {
        self.signals
            .lock()
            .entry(signal_name.to_string())
            .or_default()
            .push_back(args);
        self.signal_arrived.notify_waiters();
    }

    /// Answer a query with the handler the workflow installed
    pub fn answer_query(&self, query_name: &str, args: Value) -> Result<Value> {
        let handler = self.queries.read().get(query_name).cloned();
        match handler {
            Some(handler) => handler(args),
            None => Err(SdkError::NotRegistered(format!(
                "query '{}' on workflow '{}'",
                query_name, self.info.workflow_type
            ))),
        }
    }

    fn parent(&self) -> ParentInfo {
        ParentInfo {
            namespace: self.info.namespace.clone(),
            task_queue: self.info.task_queue.clone(),
        }
    }

    fn cancelled_error(&self) -> SdkError {
        SdkError::Cancelled(format!(
            "workflow '{}' ({})",
            self.info.workflow_type, self.info.workflow_id
        ))
    }

    /// Send a request on behalf of this execution, giving up when the
    /// execution is cancelled
    async fn call<R: ProxyRequest>(&self, request: R) -> Result<R::Reply> {
        tokio::select! {
            reply = self.transport.call(request) => reply,
            _ = self.cancel.cancelled() => Err(self.cancelled_error()),
        }
    }

    /// Persist a fresh value, then append it to the replay log.
    ///
    /// A marker the proxy did not accept never enters the log, so a failed
    /// call can be retried at the same sequence.
    async fn record(&self, kind: MarkerKind, label: Option<&str>, value: Value) -> Result<()> {
        let marker = self.replay.lock().prepare(kind, label, value);
        tracing::trace!(
            context_id = self.info.context_id,
            sequence = marker.sequence,
            kind = ?marker.kind,
            "Recording replay marker"
        );
        self.call(WorkflowMutableRequest {
            client_id: self.client_id,
            context_id: Some(self.info.context_id),
            marker: Some(marker.clone()),
            ..Default::default()
        })
        .await?;
        self.replay.lock().commit(marker)?;
        Ok(())
    }

    fn corrupt(&self, reason: impl Into<String>) -> SdkError {
        let sequence = self.replay.lock().next_sequence().saturating_sub(1);
        DeterminismViolationError::CorruptMarker {
            sequence,
            reason: reason.into(),
        }
        .into()
    }
}

#[async_trait]
impl WorkflowContext for WorkflowContextImpl {
    fn client_id(&self) -> u32 {
        self.client_id
    }

    fn context_id(&self) -> i64 {
        self.info.context_id
    }

    fn workflow_type(&self) -> &str {
        &self.info.workflow_type
    }

    fn workflow_id(&self) -> &str {
        &self.info.workflow_id
    }

    fn run_id(&self) -> &str {
        &self.info.run_id
    }

    fn namespace(&self) -> &str {
        &self.info.namespace
    }

    fn task_queue(&self) -> &str {
        &self.info.task_queue
    }

    fn is_replaying(&self) -> bool {
        self.replay.lock().is_replaying()
    }

    async fn side_effect_raw(&self, producer: SideEffectFn) -> Result<Value> {
        let _turn = self.decisions.lock().await;
        let recorded = self.replay.lock().replay_next(MarkerKind::SideEffect, None)?;
        if let Some(value) = recorded {
            return Ok(value);
        }
        let value = producer()?;
        self.record(MarkerKind::SideEffect, None, value.clone())
            .await?;
        Ok(value)
    }

    async fn get_version(
        &self,
        change_id: &str,
        min_supported: i32,
        max_supported: i32,
    ) -> Result<i32> {
        if min_supported > max_supported {
            return Err(SdkError::InvalidOperation(format!(
                "version range [{}, {}] for '{}' is empty",
                min_supported, max_supported, change_id
            )));
        }
        let _turn = self.decisions.lock().await;
        let recorded = self
            .replay
            .lock()
            .replay_next(MarkerKind::Version, Some(change_id))?;
        match recorded {
            Some(value) => {
                let version = value
                    .as_i64()
                    .and_then(|v| i32::try_from(v).ok())
                    .ok_or_else(|| self.corrupt(format!("version {} is not an i32", value)))?;
                if version < min_supported || version > max_supported {
                    return Err(DeterminismViolationError::VersionOutOfRange {
                        change_id: change_id.to_string(),
                        version,
                        min_supported,
                        max_supported,
                    }
                    .into());
                }
                Ok(version)
            }
            None => {
                self.record(MarkerKind::Version, Some(change_id), json!(max_supported))
                    .await?;
                Ok(max_supported)
            }
        }
    }

    async fn random(&self) -> Result<f64> {
        let _turn = self.decisions.lock().await;
        let recorded = self.replay.lock().replay_next(MarkerKind::Random, None)?;
        if let Some(value) = recorded {
            return value
                .as_f64()
                .ok_or_else(|| self.corrupt(format!("{} is not a number", value)));
        }
        let value: f64 = rand::random();
        self.record(MarkerKind::Random, None, json!(value)).await?;
        Ok(value)
    }

    async fn new_uuid(&self) -> Result<Uuid> {
        let _turn = self.decisions.lock().await;
        let recorded = self.replay.lock().replay_next(MarkerKind::Uuid, None)?;
        if let Some(value) = recorded {
            return value
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .ok_or_else(|| self.corrupt(format!("{} is not a UUID", value)));
        }
        let value = Uuid::new_v4();
        self.record(MarkerKind::Uuid, None, json!(value.to_string()))
            .await?;
        Ok(value)
    }

    async fn now(&self) -> Result<DateTime<Utc>> {
        let _turn = self.decisions.lock().await;
        let recorded = self.replay.lock().replay_next(MarkerKind::Now, None)?;
        if let Some(value) = recorded {
            return value
                .as_i64()
                .map(|nanos| Utc.timestamp_nanos(nanos))
                .ok_or_else(|| self.corrupt(format!("time {} is not epoch nanoseconds", value)));
        }
        let reply = self
            .call(WorkflowGetTimeRequest {
                client_id: self.client_id,
                context_id: Some(self.info.context_id),
                ..Default::default()
            })
            .await?;
        let time = reply
            .time
            .ok_or_else(|| SdkError::MalformedMessage("time reply without a time".to_string()))?;
        let nanos = time.timestamp_nanos_opt().ok_or_else(|| {
            SdkError::InvalidOperation(format!("time {} outside the nanosecond range", time))
        })?;
        self.record(MarkerKind::Now, None, json!(nanos)).await?;
        Ok(time)
    }

    async fn sleep(&self, duration: Duration) -> Result<()> {
        let nanos = i64::try_from(duration.as_nanos()).map_err(|_| {
            SdkError::InvalidOperation(format!("timer {:?} exceeds i64 nanoseconds", duration))
        })?;
        // Held for the whole timer so the marker keeps its issue order
        let _turn = self.decisions.lock().await;
        let recorded = self.replay.lock().replay_next(MarkerKind::Sleep, None)?;
        if let Some(value) = recorded {
            return match value.as_i64() {
                Some(recorded) if recorded == nanos => Ok(()),
                _ => Err(self.corrupt(format!(
                    "recorded timer {} does not match {:?}",
                    value, duration
                ))),
            };
        }
        self.call(WorkflowSleepRequest {
            client_id: self.client_id,
            context_id: Some(self.info.context_id),
            duration: Some(TimeDelta::nanoseconds(nanos)),
            ..Default::default()
        })
        .await?;
        self.record(MarkerKind::Sleep, None, json!(nanos)).await
    }

    async fn execute_activity_raw(
        &self,
        target: ActivityTarget,
        args: Value,
        options: ActivityOptions,
    ) -> Result<Value> {
        let effective = self
            .resolver
            .resolve_activity(&target, &options, Some(&self.parent()))?;
        self.hook
            .on_activity_execute(self.client_id, &self.info.workflow_id, &effective);

        let reply = self
            .call(ActivityExecuteRequest {
                client_id: self.client_id,
                context_id: Some(self.info.context_id),
                activity: Some(effective.activity_type),
                namespace: Some(effective.namespace),
                task_queue: Some(effective.task_queue),
                args: Some(payload::encode(&args)?),
                schedule_to_close_timeout: Some(interval(effective.schedule_to_close_timeout)?),
                schedule_to_start_timeout: Some(interval(effective.schedule_to_start_timeout)?),
                start_to_close_timeout: Some(interval(effective.start_to_close_timeout)?),
                heartbeat_timeout: Some(interval(effective.heartbeat_timeout)?),
                ..Default::default()
            })
            .await?;
        payload::decode(reply.result)
    }

    async fn execute_local_activity_raw(
        &self,
        target: ActivityTarget,
        args: Value,
        options: ActivityOptions,
    ) -> Result<Value> {
        let effective = self
            .resolver
            .resolve_activity(&target, &options, Some(&self.parent()))?;
        self.hook
            .on_activity_execute(self.client_id, &self.info.workflow_id, &effective);

        let reply = self
            .call(ActivityExecuteLocalRequest {
                client_id: self.client_id,
                context_id: Some(self.info.context_id),
                activity: Some(effective.activity_type),
                args: Some(payload::encode(&args)?),
                schedule_to_close_timeout: Some(interval(effective.schedule_to_close_timeout)?),
                start_to_close_timeout: Some(interval(effective.start_to_close_timeout)?),
                ..Default::default()
            })
            .await?;
        payload::decode(reply.result)
    }

    async fn execute_child_workflow_raw(
        &self,
        target: WorkflowTarget,
        args: Value,
        options: ChildWorkflowOptions,
    ) -> Result<Value> {
        let effective = self
            .resolver
            .resolve_child(&target, &options, &self.parent())?;
        self.hook
            .on_child_workflow_start(self.client_id, &self.info.workflow_id, &effective);

        let reply = self
            .call(WorkflowExecuteChildRequest {
                client_id: self.client_id,
                context_id: Some(self.info.context_id),
                workflow: Some(effective.workflow_type),
                workflow_id: effective.workflow_id,
                namespace: Some(effective.namespace),
                task_queue: Some(effective.task_queue),
                args: Some(payload::encode(&args)?),
                execution_timeout: Some(interval(effective.execution_timeout)?),
                run_timeout: Some(interval(effective.run_timeout)?),
                task_timeout: Some(interval(effective.task_timeout)?),
                id_reuse_policy: Some(effective.id_reuse_policy),
                ..Default::default()
            })
            .await?;
        payload::decode(reply.result)
    }

    async fn wait_for_signal_raw(&self, signal_name: &str) -> Result<Value> {
        loop {
            // Registered before the queue check so a signal delivered in
            // between still wakes us.
            let arrived = self.signal_arrived.notified();
            let next = self
                .signals
                .lock()
                .get_mut(signal_name)
                .and_then(VecDeque::pop_front);
            if let Some(args) = next {
                return Ok(args);
            }
            tokio::select! {
                _ = arrived => {}
                _ = self.cancel.cancelled() => return Err(self.cancelled_error()),
            }
        }
    }

    fn set_query_handler_raw(&self, query_name: &str, handler: QueryHandlerFn) -> Result<()> {
        self.queries.write().insert(query_name.to_string(), handler);
        Ok(())
    }

    fn is_cancellation_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn check_cancellation(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(self.cancelled_error());
        }
        Ok(())
    }
}

impl std::fmt::Debug for WorkflowContextImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowContextImpl")
            .field("client_id", &self.client_id)
            .field("info", &self.info)
            .field("replaying", &self.is_replaying())
            .finish()
    }
}
