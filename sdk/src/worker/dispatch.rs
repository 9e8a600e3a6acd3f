//! Routing of proxy-initiated invocations to client implementations
//!
//! Every invocation carries the `ClientId` of the client whose worker
//! received it. The dispatcher looks that client up and runs the workflow
//! or activity registered there, so clients sharing one transport never
//! see each other's work even when they register the same type names.

use crate::activity::{ActivityContext, ActivityContextImpl, ActivityInfo};
use crate::client::ClientShared;
use crate::common::payload;
use crate::error::{Result, SdkError};
use crate::transport::{CancelSignal, InboundHandler};
use crate::workflow::{WorkflowContext, WorkflowContextImpl, WorkflowInfo};
use async_trait::async_trait;
use durable_proxy_core::protocol::messages::{
    ActivityInvokeLocalReply, ActivityInvokeLocalRequest, ActivityInvokeReply,
    ActivityInvokeRequest, ActivityStoppingReply, ActivityStoppingRequest,
    WorkflowInvokeReply, WorkflowInvokeRequest, WorkflowQueryInvokeReply,
    WorkflowQueryInvokeRequest, WorkflowSignalInvokeReply, WorkflowSignalInvokeRequest,
};
use durable_proxy_core::{MessageType, ProxyMessage, ReplayState, TypedMessage};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info_span, Instrument};

/// Connected clients by id
pub(crate) type ClientTable = RwLock<HashMap<u32, Arc<ClientShared>>>;

/// Request types the proxy sends to the SDK on behalf of a client
pub(crate) const INBOUND_TYPES: [MessageType; 6] = [
    MessageType::WorkflowInvokeRequest,
    MessageType::WorkflowSignalInvokeRequest,
    MessageType::WorkflowQueryInvokeRequest,
    MessageType::ActivityInvokeRequest,
    MessageType::ActivityInvokeLocalRequest,
    MessageType::ActivityStoppingRequest,
];

/// The transport handler for every type in [`INBOUND_TYPES`]
pub(crate) struct Dispatcher {
    clients: Weak<ClientTable>,
}

impl Dispatcher {
    pub(crate) fn new(clients: Weak<ClientTable>) -> Self {
        Self { clients }
    }

    fn client(&self, client_id: u32) -> Result<Arc<ClientShared>> {
        self.clients
            .upgrade()
            .and_then(|clients| clients.read().get(&client_id).cloned())
            .ok_or_else(|| SdkError::NotRegistered(format!("client {}", client_id)))
    }
}

fn into_reply<T: TypedMessage>(reply: T) -> Result<ProxyMessage> {
    Ok(reply.into_message()?)
}

#[async_trait]
impl InboundHandler for Dispatcher {
    async fn handle(&self, request: ProxyMessage, cancel: CancelSignal) -> Result<ProxyMessage> {
        let client = self.client(request.client_id()?)?;
        match request.message_type {
            MessageType::WorkflowInvokeRequest => {
                let request = WorkflowInvokeRequest::try_from_message(request)?;
                into_reply(invoke_workflow(&client, request, cancel).await?)
            }
            MessageType::WorkflowSignalInvokeRequest => {
                let request = WorkflowSignalInvokeRequest::try_from_message(request)?;
                into_reply(deliver_signal(&client, request)?)
            }
            MessageType::WorkflowQueryInvokeRequest => {
                let request = WorkflowQueryInvokeRequest::try_from_message(request)?;
                into_reply(answer_query(&client, request)?)
            }
            MessageType::ActivityInvokeRequest => {
                let request = ActivityInvokeRequest::try_from_message(request)?;
                into_reply(invoke_activity(&client, request, cancel).await?)
            }
            MessageType::ActivityInvokeLocalRequest => {
                let request = ActivityInvokeLocalRequest::try_from_message(request)?;
                into_reply(invoke_local_activity(&client, request, cancel).await?)
            }
            MessageType::ActivityStoppingRequest => {
                let request = ActivityStoppingRequest::try_from_message(request)?;
                into_reply(stop_activity(&client, request))
            }
            other => Err(SdkError::InvalidOperation(format!(
                "{} is not a client invocation",
                other
            ))),
        }
    }
}

async fn invoke_workflow(
    client: &ClientShared,
    request: WorkflowInvokeRequest,
    cancel: CancelSignal,
) -> Result<WorkflowInvokeReply> {
    let workflow_type = request.workflow.unwrap_or_default();
    let workflow = client.workflows.get(&workflow_type).ok_or_else(|| {
        SdkError::NotRegistered(format!(
            "workflow '{}' on client {}",
            workflow_type, client.client_id
        ))
    })?;
    let input = payload::decode(request.args)?;

    let context_id = request.context_id.unwrap_or_default();
    let info = WorkflowInfo {
        context_id,
        workflow_type,
        workflow_id: request.workflow_id.unwrap_or_default(),
        run_id: request.run_id.unwrap_or_default(),
        namespace: request
            .namespace
            .unwrap_or_else(|| client.settings.namespace.clone()),
        task_queue: request.task_queue.unwrap_or_default(),
    };
    let replay = ReplayState::from_history(
        request.history.unwrap_or_default(),
        request.replay_requested.unwrap_or(false),
    );
    let ctx = Arc::new(WorkflowContextImpl::new(
        client.transport.clone(),
        client.client_id,
        info.clone(),
        replay,
        Arc::clone(&client.resolver),
        Arc::clone(&client.hook),
        cancel,
    ));

    let span = info_span!(
        "workflow",
        client_id = client.client_id,
        context_id,
        workflow_type = %info.workflow_type,
        workflow_id = %info.workflow_id,
    );
    client.executions.lock().insert(context_id, Arc::clone(&ctx));
    debug!(parent: &span, replaying = ctx.is_replaying(), "Workflow invoked");
    let outcome = workflow
        .execute(ctx as Arc<dyn WorkflowContext>, input)
        .instrument(span)
        .await;
    client.executions.lock().remove(&context_id);

    match outcome {
        Ok(result) => {
            client
                .hook
                .on_workflow_completed(client.client_id, &info.workflow_type, &info.workflow_id);
            Ok(WorkflowInvokeReply {
                result: Some(payload::encode(&result)?),
                ..Default::default()
            })
        }
        Err(e) => {
            client.hook.on_workflow_failed(
                client.client_id,
                &info.workflow_type,
                &info.workflow_id,
                &e.to_string(),
            );
            Err(e)
        }
    }
}

fn execution(client: &ClientShared, context_id: Option<i64>) -> Result<Arc<WorkflowContextImpl>> {
    let context_id = context_id.unwrap_or_default();
    client
        .executions
        .lock()
        .get(&context_id)
        .cloned()
        .ok_or_else(|| {
            SdkError::NotRegistered(format!(
                "workflow execution {} on client {}",
                context_id, client.client_id
            ))
        })
}

fn deliver_signal(
    client: &ClientShared,
    request: WorkflowSignalInvokeRequest,
) -> Result<WorkflowSignalInvokeReply> {
    let ctx = execution(client, request.context_id)?;
    let signal_name = request.signal_name.unwrap_or_default();
    debug!(
        client_id = client.client_id,
        context_id = ctx.context_id(),
        signal_name = %signal_name,
        "Signal delivered"
    );
    ctx.deliver_signal(&signal_name, payload::decode(request.signal_args)?);
    Ok(WorkflowSignalInvokeReply::default())
}

fn answer_query(
    client: &ClientShared,
    request: WorkflowQueryInvokeRequest,
) -> Result<WorkflowQueryInvokeReply> {
    let ctx = execution(client, request.context_id)?;
    let query_name = request.query_name.unwrap_or_default();
    let result = ctx.answer_query(&query_name, payload::decode(request.query_args)?)?;
    Ok(WorkflowQueryInvokeReply {
        result: Some(payload::encode(&result)?),
        ..Default::default()
    })
}

async fn invoke_activity(
    client: &ClientShared,
    request: ActivityInvokeRequest,
    cancel: CancelSignal,
) -> Result<ActivityInvokeReply> {
    let info = ActivityInfo {
        context_id: request.context_id.unwrap_or_default(),
        activity_type: request.activity.unwrap_or_default(),
        activity_id: request.activity_id.unwrap_or_default(),
        namespace: request
            .namespace
            .unwrap_or_else(|| client.settings.namespace.clone()),
        task_queue: request.task_queue.unwrap_or_default(),
        task_token: request.task_token.unwrap_or_default(),
        local: false,
    };
    match run_activity(client, info, request.args, cancel).await? {
        Some(result) => Ok(ActivityInvokeReply {
            result: Some(payload::encode(&result)?),
            ..Default::default()
        }),
        None => Ok(ActivityInvokeReply {
            pending: Some(true),
            ..Default::default()
        }),
    }
}

async fn invoke_local_activity(
    client: &ClientShared,
    request: ActivityInvokeLocalRequest,
    cancel: CancelSignal,
) -> Result<ActivityInvokeLocalReply> {
    let info = ActivityInfo {
        context_id: request.context_id.unwrap_or_default(),
        activity_type: request.activity.unwrap_or_default(),
        activity_id: request.activity_id.unwrap_or_default(),
        namespace: client.settings.namespace.clone(),
        local: true,
        ..Default::default()
    };
    let result = run_activity(client, info, request.args, cancel).await?;
    Ok(ActivityInvokeLocalReply {
        result: Some(payload::encode(&result.unwrap_or(Value::Null))?),
        ..Default::default()
    })
}

/// Run a registered activity. `None` means the activity deferred its
/// completion to [`ProxyClient::complete_activity`](crate::client::ProxyClient::complete_activity).
async fn run_activity(
    client: &ClientShared,
    info: ActivityInfo,
    args: Option<Vec<u8>>,
    cancel: CancelSignal,
) -> Result<Option<Value>> {
    let activity = client.activities.get(&info.activity_type).ok_or_else(|| {
        SdkError::NotRegistered(format!(
            "activity '{}' on client {}",
            info.activity_type, client.client_id
        ))
    })?;
    let input = payload::decode(args)?;

    let context_id = info.context_id;
    let span = info_span!(
        "activity",
        client_id = client.client_id,
        context_id,
        activity_type = %info.activity_type,
        local = info.local,
    );
    let ctx = Arc::new(ActivityContextImpl::new(
        client.transport.clone(),
        client.client_id,
        info,
        cancel.clone(),
    ));

    client.running_activities.lock().insert(context_id, cancel);
    let handle: Arc<dyn ActivityContext> = Arc::clone(&ctx) as Arc<dyn ActivityContext>;
    let outcome = activity.execute(handle, input).instrument(span).await;
    client.running_activities.lock().remove(&context_id);

    let result = outcome?;
    if ctx.completion_deferred() {
        debug!(client_id = client.client_id, context_id, "Activity completion deferred");
        return Ok(None);
    }
    Ok(Some(result))
}

fn stop_activity(client: &ClientShared, request: ActivityStoppingRequest) -> ActivityStoppingReply {
    let context_id = request.context_id.unwrap_or_default();
    let signal = client.running_activities.lock().get(&context_id).cloned();
    match signal {
        Some(signal) => {
            signal.cancel();
            debug!(client_id = client.client_id, context_id, "Activity stopping");
        }
        None => debug!(
            client_id = client.client_id,
            context_id, "Stop requested for an activity that is not running"
        ),
    }
    ActivityStoppingReply::default()
}

/// Register the dispatcher for every client invocation type
pub(crate) fn install(transport: &crate::transport::ProxyTransport, clients: Weak<ClientTable>) {
    let dispatcher: Arc<dyn InboundHandler> = Arc::new(Dispatcher::new(clients));
    for message_type in INBOUND_TYPES {
        transport.register_handler(message_type, Arc::clone(&dispatcher));
    }
}
