//! ProxyClient - one logical client session multiplexed over the transport

use crate::activity::{ActivityContext, ActivityDefinition};
use crate::client::hook::ClientHook;
use crate::common::payload;
use crate::config::ClientSettings;
use crate::error::{Result, SdkError};
use crate::options::{OptionsResolver, StartWorkflowOptions, WorkflowTarget};
use crate::transport::{CancelSignal, ProxyTransport};
use crate::worker::dispatch::ClientTable;
use crate::worker::{
    ActivityRegistry, DisposeOutcome, WorkerHandle, WorkerPool, WorkflowRegistration,
    WorkflowRegistry,
};
use crate::workflow::{WorkflowContextImpl, WorkflowDefinition};
use durable_proxy_core::protocol::interval;
use durable_proxy_core::protocol::messages::{
    ActivityCompleteRequest, ActivityRegisterRequest, DisconnectRequest, PingRequest,
    SetCacheSizeRequest, WorkflowCancelRequest, WorkflowDescribeExecutionRequest,
    WorkflowExecuteRequest, WorkflowExecutionDescription, WorkflowGetResultRequest,
    WorkflowQueryRequest, WorkflowRegisterRequest, WorkflowSignalRequest,
    WorkflowSignalWithStartRequest, WorkflowTerminateRequest,
};
use durable_proxy_core::{ProxyError, ProxyRequest, WorkerKind};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// State shared between a [`ProxyClient`] and the invocations delivered
/// to it
pub(crate) struct ClientShared {
    pub(crate) client_id: u32,
    pub(crate) settings: ClientSettings,
    pub(crate) transport: ProxyTransport,
    pub(crate) resolver: Arc<OptionsResolver>,
    pub(crate) hook: Arc<dyn ClientHook>,
    pub(crate) workflows: WorkflowRegistry,
    pub(crate) activities: ActivityRegistry,
    pub(crate) workers: WorkerPool,
    /// Running workflow executions by `ContextId`
    pub(crate) executions: Mutex<HashMap<i64, Arc<WorkflowContextImpl>>>,
    /// Cancellation of running activities by `ContextId`
    pub(crate) running_activities: Mutex<HashMap<i64, CancelSignal>>,
    disconnected: AtomicBool,
}

impl ClientShared {
    pub(crate) fn new(
        client_id: u32,
        settings: ClientSettings,
        transport: ProxyTransport,
        hook: Arc<dyn ClientHook>,
    ) -> Self {
        Self {
            client_id,
            resolver: Arc::new(OptionsResolver::new(settings.clone())),
            settings,
            workers: WorkerPool::new(transport.clone(), client_id),
            transport,
            hook,
            workflows: WorkflowRegistry::new(),
            activities: ActivityRegistry::new(),
            executions: Mutex::new(HashMap::new()),
            running_activities: Mutex::new(HashMap::new()),
            disconnected: AtomicBool::new(false),
        }
    }

    pub(crate) fn mark_disconnected(&self) -> bool {
        !self.disconnected.swap(true, Ordering::SeqCst)
    }
}

/// A started workflow execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowExecution {
    pub workflow_id: String,
    pub run_id: String,
    pub namespace: String,
}

/// A logical client: one namespace, one set of defaults, its own workflow
/// and activity registrations and workers, sharing the proxy transport
/// with every other client of the same [`ClientRegistry`](super::ClientRegistry).
#[derive(Clone)]
pub struct ProxyClient {
    pub(crate) shared: Arc<ClientShared>,
    pub(crate) clients: Arc<ClientTable>,
}

impl ProxyClient {
    pub fn client_id(&self) -> u32 {
        self.shared.client_id
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.shared.settings
    }

    pub fn resolver(&self) -> &OptionsResolver {
        &self.shared.resolver
    }

    pub fn is_connected(&self) -> bool {
        !self.shared.disconnected.load(Ordering::SeqCst) && self.shared.transport.is_connected()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.shared.disconnected.load(Ordering::SeqCst) {
            return Err(SdkError::InvalidOperation(format!(
                "client {} is disconnected",
                self.client_id()
            )));
        }
        Ok(())
    }

    /// Send a request stamped with this client's id
    pub(crate) async fn call<R: ProxyRequest>(&self, mut request: R) -> Result<R::Reply> {
        self.ensure_connected()?;
        request.set_client_id(self.client_id());
        self.shared.transport.call(request).await
    }

    // === Registration ===

    /// Host a workflow on this client
    pub async fn register_workflow<W: WorkflowDefinition>(&self, workflow: W) -> Result<()> {
        self.register_workflow_registration(WorkflowRegistration::of(workflow))
            .await
    }

    /// Host a workflow described by an explicit registration
    pub async fn register_workflow_registration(
        &self,
        registration: WorkflowRegistration,
    ) -> Result<()> {
        self.ensure_connected()?;
        let metadata = self.shared.workflows.register(registration)?;
        for (announced, entry) in metadata.iter().enumerate() {
            let result = self
                .call(WorkflowRegisterRequest {
                    name: Some(entry.workflow_type.clone()),
                    signals: Some(entry.signals.clone()),
                    queries: Some(entry.queries.clone()),
                    ..Default::default()
                })
                .await;
            if let Err(e) = result {
                // Entries the proxy already accepted stay hosted
                for entry in &metadata[announced..] {
                    self.shared.workflows.unregister(&entry.workflow_type);
                }
                return Err(e);
            }
            debug!(client_id = self.client_id(), workflow_type = %entry.workflow_type, "Workflow registered");
        }
        Ok(())
    }

    /// Host an activity on this client
    pub async fn register_activity<A: ActivityDefinition>(&self, activity: A) -> Result<()> {
        self.ensure_connected()?;
        self.shared.activities.register(activity)?;
        self.announce_activity(A::ACTIVITY_TYPE).await
    }

    /// Host an untyped activity function on this client
    pub async fn register_activity_fn<F, Fut>(&self, activity_type: &str, execute_fn: F) -> Result<()>
    where
        F: Fn(Arc<dyn ActivityContext>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.ensure_connected()?;
        self.shared.activities.register_fn(activity_type, execute_fn)?;
        self.announce_activity(activity_type).await
    }

    pub(crate) async fn announce_activity(&self, activity_type: &str) -> Result<()> {
        let result = self
            .call(ActivityRegisterRequest {
                name: Some(activity_type.to_string()),
                ..Default::default()
            })
            .await;
        if let Err(e) = result {
            self.shared.activities.unregister(activity_type);
            return Err(e);
        }
        debug!(client_id = self.client_id(), activity_type, "Activity registered");
        Ok(())
    }

    // === Workers ===

    /// Get or create the worker for a namespace and task queue, falling
    /// back to the client defaults for either
    pub async fn new_worker(
        &self,
        namespace: Option<&str>,
        task_queue: Option<&str>,
        kind: WorkerKind,
    ) -> Result<Arc<WorkerHandle>> {
        self.ensure_connected()?;
        let namespace = namespace
            .filter(|n| !n.is_empty())
            .unwrap_or(self.shared.settings.namespace.as_str());
        let task_queue = task_queue
            .filter(|q| !q.is_empty())
            .or(self.shared.settings.task_queue.as_deref())
            .ok_or_else(|| SdkError::MissingTaskQueue(format!("{:?} worker", kind)))?;
        self.shared
            .workers
            .get_or_create(namespace, task_queue, kind)
            .await
    }

    pub async fn start_worker(&self, handle: &WorkerHandle) -> Result<()> {
        self.ensure_connected()?;
        self.shared.workers.start(handle).await
    }

    pub async fn dispose_worker(&self, handle: &WorkerHandle) -> Result<DisposeOutcome> {
        self.shared.workers.dispose(handle).await
    }

    // === Workflow operations ===

    /// Start workflow `W` and return without waiting for it to finish
    pub async fn start_workflow<W: WorkflowDefinition>(
        &self,
        input: W::Input,
        options: StartWorkflowOptions,
    ) -> Result<WorkflowExecution> {
        let args = serde_json::to_value(input)?;
        self.start_workflow_raw(WorkflowTarget::of::<W>(), args, options)
            .await
    }

    pub async fn start_workflow_raw(
        &self,
        target: WorkflowTarget,
        args: Value,
        options: StartWorkflowOptions,
    ) -> Result<WorkflowExecution> {
        self.ensure_connected()?;
        let effective = self.shared.resolver.resolve_start(&target, &options)?;
        self.shared.hook.on_workflow_start(self.client_id(), &effective);

        let reply = self
            .call(WorkflowExecuteRequest {
                workflow: Some(effective.workflow_type.clone()),
                workflow_id: effective.workflow_id.clone(),
                namespace: Some(effective.namespace.clone()),
                task_queue: Some(effective.task_queue.clone()),
                args: Some(payload::encode(&args)?),
                execution_timeout: Some(interval(effective.execution_timeout)?),
                run_timeout: Some(interval(effective.run_timeout)?),
                task_timeout: Some(interval(effective.task_timeout)?),
                id_reuse_policy: Some(effective.id_reuse_policy),
                ..Default::default()
            })
            .await?;

        let execution = WorkflowExecution {
            workflow_id: reply.workflow_id.or(effective.workflow_id).unwrap_or_default(),
            run_id: reply.run_id.unwrap_or_default(),
            namespace: effective.namespace,
        };
        info!(
            client_id = self.client_id(),
            workflow_type = %effective.workflow_type,
            workflow_id = %execution.workflow_id,
            run_id = %execution.run_id,
            "Workflow started"
        );
        Ok(execution)
    }

    /// Signal workflow `W`, starting it first if no execution with the
    /// resolved workflow id is running
    pub async fn signal_with_start<W: WorkflowDefinition, S: Serialize>(
        &self,
        input: W::Input,
        signal_name: &str,
        signal_args: &S,
        options: StartWorkflowOptions,
    ) -> Result<WorkflowExecution> {
        let args = serde_json::to_value(input)?;
        let signal_args = serde_json::to_value(signal_args)?;
        self.signal_with_start_raw(WorkflowTarget::of::<W>(), args, signal_name, signal_args, options)
            .await
    }

    pub async fn signal_with_start_raw(
        &self,
        target: WorkflowTarget,
        args: Value,
        signal_name: &str,
        signal_args: Value,
        options: StartWorkflowOptions,
    ) -> Result<WorkflowExecution> {
        self.ensure_connected()?;
        let effective = self.shared.resolver.resolve_start(&target, &options)?;
        let workflow_id = effective.workflow_id.clone().ok_or_else(|| {
            SdkError::InvalidOperation(format!(
                "signal-with-start of '{}' needs a workflow id",
                effective.workflow_type
            ))
        })?;
        self.shared.hook.on_workflow_start(self.client_id(), &effective);

        let reply = self
            .call(WorkflowSignalWithStartRequest {
                workflow: Some(effective.workflow_type.clone()),
                workflow_id: Some(workflow_id.clone()),
                namespace: Some(effective.namespace.clone()),
                task_queue: Some(effective.task_queue.clone()),
                args: Some(payload::encode(&args)?),
                execution_timeout: Some(interval(effective.execution_timeout)?),
                run_timeout: Some(interval(effective.run_timeout)?),
                task_timeout: Some(interval(effective.task_timeout)?),
                id_reuse_policy: Some(effective.id_reuse_policy),
                signal_name: Some(signal_name.to_string()),
                signal_args: Some(payload::encode(&signal_args)?),
                ..Default::default()
            })
            .await?;

        let execution = WorkflowExecution {
            workflow_id: reply.workflow_id.unwrap_or(workflow_id),
            run_id: reply.run_id.unwrap_or_default(),
            namespace: effective.namespace,
        };
        info!(
            client_id = self.client_id(),
            workflow_type = %effective.workflow_type,
            workflow_id = %execution.workflow_id,
            run_id = %execution.run_id,
            signal_name,
            "Workflow signalled with start"
        );
        Ok(execution)
    }

    /// Status and timing of an execution as the server sees it
    pub async fn describe_workflow(
        &self,
        execution: &WorkflowExecution,
    ) -> Result<WorkflowExecutionDescription> {
        let reply = self
            .call(WorkflowDescribeExecutionRequest {
                workflow_id: Some(execution.workflow_id.clone()),
                run_id: Some(execution.run_id.clone()).filter(|id| !id.is_empty()),
                namespace: Some(execution.namespace.clone()),
                ..Default::default()
            })
            .await?;
        reply.details.ok_or_else(|| {
            SdkError::MalformedMessage(format!(
                "describe of workflow '{}' returned no details",
                execution.workflow_id
            ))
        })
    }

    /// Start workflow `W` and wait for its result
    pub async fn execute_workflow<W: WorkflowDefinition>(
        &self,
        input: W::Input,
        options: StartWorkflowOptions,
    ) -> Result<W::Output> {
        let execution = self.start_workflow::<W>(input, options).await?;
        self.get_result(&execution).await
    }

    pub async fn get_result_raw(&self, execution: &WorkflowExecution) -> Result<Value> {
        let reply = self
            .call(WorkflowGetResultRequest {
                workflow_id: Some(execution.workflow_id.clone()),
                run_id: Some(execution.run_id.clone()),
                namespace: Some(execution.namespace.clone()),
                ..Default::default()
            })
            .await?;
        payload::decode(reply.result)
    }

    pub async fn get_result<T: DeserializeOwned>(&self, execution: &WorkflowExecution) -> Result<T> {
        Ok(serde_json::from_value(self.get_result_raw(execution).await?)?)
    }

    pub async fn signal_workflow<T: Serialize>(
        &self,
        execution: &WorkflowExecution,
        signal_name: &str,
        args: &T,
    ) -> Result<()> {
        let args = serde_json::to_value(args)?;
        self.call(WorkflowSignalRequest {
            workflow_id: Some(execution.workflow_id.clone()),
            run_id: Some(execution.run_id.clone()),
            namespace: Some(execution.namespace.clone()),
            signal_name: Some(signal_name.to_string()),
            signal_args: Some(payload::encode(&args)?),
            ..Default::default()
        })
        .await?;
        Ok(())
    }

    pub async fn query_workflow<A: Serialize, T: DeserializeOwned>(
        &self,
        execution: &WorkflowExecution,
        query_name: &str,
        args: &A,
    ) -> Result<T> {
        let args = serde_json::to_value(args)?;
        let reply = self
            .call(WorkflowQueryRequest {
                workflow_id: Some(execution.workflow_id.clone()),
                run_id: Some(execution.run_id.clone()),
                namespace: Some(execution.namespace.clone()),
                query_name: Some(query_name.to_string()),
                query_args: Some(payload::encode(&args)?),
                ..Default::default()
            })
            .await?;
        Ok(serde_json::from_value(payload::decode(reply.result)?)?)
    }

    /// Request cancellation; the workflow observes it cooperatively
    pub async fn cancel_workflow(&self, execution: &WorkflowExecution) -> Result<()> {
        self.call(WorkflowCancelRequest {
            workflow_id: Some(execution.workflow_id.clone()),
            run_id: Some(execution.run_id.clone()),
            namespace: Some(execution.namespace.clone()),
            ..Default::default()
        })
        .await?;
        Ok(())
    }

    pub async fn terminate_workflow(
        &self,
        execution: &WorkflowExecution,
        reason: &str,
        details: Option<Value>,
    ) -> Result<()> {
        let details = details.as_ref().map(payload::encode).transpose()?;
        self.call(WorkflowTerminateRequest {
            workflow_id: Some(execution.workflow_id.clone()),
            run_id: Some(execution.run_id.clone()),
            namespace: Some(execution.namespace.clone()),
            reason: Some(reason.to_string()),
            details,
            ..Default::default()
        })
        .await?;
        Ok(())
    }

    // === External activity completion ===

    /// Complete an activity that deferred its result, identified by the
    /// task token it was invoked with
    pub async fn complete_activity(
        &self,
        task_token: &[u8],
        outcome: std::result::Result<Value, ProxyError>,
    ) -> Result<()> {
        if task_token.is_empty() {
            return Err(SdkError::InvalidOperation(
                "activity completion needs a task token".to_string(),
            ));
        }
        self.send_completion(
            ActivityCompleteRequest {
                task_token: Some(task_token.to_vec()),
                ..Default::default()
            },
            outcome,
        )
        .await
    }

    /// Complete an activity that deferred its result, identified by its
    /// workflow execution and activity id
    pub async fn complete_activity_by_id(
        &self,
        execution: &WorkflowExecution,
        activity_id: &str,
        outcome: std::result::Result<Value, ProxyError>,
    ) -> Result<()> {
        self.send_completion(
            ActivityCompleteRequest {
                namespace: Some(execution.namespace.clone()),
                workflow_id: Some(execution.workflow_id.clone()),
                run_id: Some(execution.run_id.clone()).filter(|id| !id.is_empty()),
                activity_id: Some(activity_id.to_string()),
                ..Default::default()
            },
            outcome,
        )
        .await
    }

    async fn send_completion(
        &self,
        mut request: ActivityCompleteRequest,
        outcome: std::result::Result<Value, ProxyError>,
    ) -> Result<()> {
        match outcome {
            Ok(value) => request.result = Some(payload::encode(&value)?),
            Err(error) => request.error = Some(error),
        }
        self.call(request).await?;
        debug!(client_id = self.client_id(), "Activity completed externally");
        Ok(())
    }

    // === Proxy housekeeping ===

    pub async fn ping(&self) -> Result<()> {
        self.call(PingRequest::default()).await?;
        Ok(())
    }

    /// Size of the proxy's sticky workflow cache
    pub async fn set_cache_size(&self, size: i32) -> Result<()> {
        if size < 0 {
            return Err(SdkError::InvalidConfiguration(format!(
                "cache size must not be negative, got {}",
                size
            )));
        }
        self.call(SetCacheSizeRequest {
            size: Some(size),
            ..Default::default()
        })
        .await?;
        Ok(())
    }

    /// Stop this client's workers, close its session and forget it.
    /// Disconnecting twice is an error.
    pub async fn disconnect(&self) -> Result<()> {
        let client_id = self.client_id();
        if !self.shared.mark_disconnected() {
            return Err(SdkError::InvalidOperation(format!(
                "client {} is already disconnected",
                client_id
            )));
        }

        let workers = self.shared.workers.dispose_all().await;
        if let Err(e) = &workers {
            warn!(client_id, error = %e, "Failed to stop workers on disconnect");
        }
        let disconnect = self
            .shared
            .transport
            .call(DisconnectRequest {
                client_id,
                ..Default::default()
            })
            .await;
        self.clients.write().remove(&client_id);
        info!(client_id, "Client disconnected");

        workers?;
        disconnect?;
        Ok(())
    }
}

impl std::fmt::Debug for ProxyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyClient")
            .field("client_id", &self.client_id())
            .field("namespace", &self.shared.settings.namespace)
            .field("task_queue", &self.shared.settings.task_queue)
            .finish()
    }
}
