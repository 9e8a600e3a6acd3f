//! In-process stand-in for the proxy
//!
//! Speaks the real frame codec over a duplex pipe. It acknowledges
//! session and worker requests, remembers registrations and namespaces,
//! and turns `GetResult`, child workflow and activity requests into
//! invocations sent back to whichever client hosts the target on a
//! started worker, the way the proxy routes work through the
//! orchestration server.

use chrono::{DateTime, Utc};
use durable_proxy_core::protocol::messages::*;
use durable_proxy_core::protocol::LENGTH_PREFIX_SIZE;
use durable_proxy_core::{
    MessageCodec, MessageType, ProxyError, ProxyMessage, ProxyRequest, ReplayMarker,
    TypedMessage, WorkerKind,
};
use durable_proxy_sdk::{ClientRegistry, ProxyTransport, TransportConfig};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, DuplexStream, WriteHalf};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone)]
pub struct FakeWorker {
    pub client_id: u32,
    pub namespace: String,
    pub task_queue: String,
    pub kind: WorkerKind,
    pub started: bool,
    /// When the worker began polling
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct Execution {
    workflow_id: String,
    run_id: String,
    workflow_type: String,
    namespace: String,
    task_queue: String,
    args: Option<Vec<u8>>,
    status: WorkflowExecutionStatus,
    start_time: DateTime<Utc>,
    close_time: Option<DateTime<Utc>>,
}

type Outcome = Result<Option<Vec<u8>>, ProxyError>;

/// An activity that asked to be completed through `ActivityComplete`
struct Deferred {
    task_token: Vec<u8>,
    activity_id: String,
    done: oneshot::Sender<Outcome>,
}

#[derive(Default)]
struct State {
    received: Vec<ProxyMessage>,
    failures: HashMap<MessageType, ProxyError>,
    /// Successes left before a type starts failing
    failures_after: HashMap<MessageType, (usize, ProxyError)>,
    workflows: Vec<(u32, String)>,
    activities: Vec<(u32, String)>,
    workers: HashMap<i64, FakeWorker>,
    executions: HashMap<String, Execution>,
    /// workflow id -> (client id, context id) while an invocation is out
    running: HashMap<String, (u32, i64)>,
    /// Signals for executions that were started by signal-with-start and
    /// are not running yet
    queued_signals: HashMap<String, Vec<(Option<String>, Option<Vec<u8>>)>>,
    histories: HashMap<String, Vec<ReplayMarker>>,
    namespaces: BTreeMap<String, NamespaceInfo>,
    cache_size: Option<i32>,
    /// activity context id -> activity id
    activity_ids: HashMap<i64, String>,
    /// activity type -> (client id, context id) while an invocation is out
    running_activities: HashMap<String, (u32, i64)>,
    heartbeat_details: HashMap<String, Vec<u8>>,
    activity_attempts: usize,
    deferred: Vec<Deferred>,
    next_worker_id: i64,
    next_context_id: i64,
    next_run: u32,
}

impl State {
    /// Client hosting `name` on a started worker for `task_queue`
    fn route(&self, task_queue: &str, excluded: WorkerKind, hosts: &[(u32, String)], name: &str) -> Option<u32> {
        self.workers
            .values()
            .filter(|w| w.started && w.task_queue == task_queue && w.kind != excluded)
            .map(|w| w.client_id)
            .find(|client_id| hosts.iter().any(|(c, n)| c == client_id && n == name))
    }

    fn workflow_of_context(&self, context_id: i64) -> Option<(String, u32)> {
        self.running
            .iter()
            .find(|(_, (_, c))| *c == context_id)
            .map(|(id, (client_id, _))| (id.clone(), *client_id))
    }

    fn next_context(&mut self) -> i64 {
        self.next_context_id += 1;
        self.next_context_id
    }
}

enum Outbound {
    Frame(ProxyMessage),
    HangUp,
}

struct Shared {
    state: Mutex<State>,
    outbound: mpsc::UnboundedSender<Outbound>,
    pending: Mutex<HashMap<u32, oneshot::Sender<ProxyMessage>>>,
    /// SDK requests still being answered, for `CancelRequest`
    inflight: Mutex<HashMap<u32, oneshot::Sender<()>>>,
    next_request_id: AtomicU32,
    answer_heartbeats: AtomicBool,
}

/// Handle on the fake proxy end of the pipe
#[derive(Clone)]
pub struct FakeProxy {
    shared: Arc<Shared>,
}

impl FakeProxy {
    /// Start a fake proxy and a registry connected to it
    pub fn start(config: TransportConfig) -> (ClientRegistry, FakeProxy) {
        let (local, remote) = tokio::io::duplex(1 << 20);
        let (reader, writer) = tokio::io::split(remote);
        let (outbound, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                next_worker_id: 100,
                activity_attempts: 1,
                ..Default::default()
            }),
            outbound,
            pending: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            next_request_id: AtomicU32::new(1),
            answer_heartbeats: AtomicBool::new(true),
        });
        tokio::spawn(write_loop(writer, rx));
        tokio::spawn(read_loop(reader, Arc::clone(&shared)));

        let registry = ClientRegistry::new(ProxyTransport::new(local, config));
        (registry, FakeProxy { shared })
    }

    /// A proxy that writes every frame it reads straight back after a
    /// decode and re-encode. Returns the caller's end of the pipe.
    pub fn start_echo() -> DuplexStream {
        let (local, remote) = tokio::io::duplex(1 << 20);
        tokio::spawn(async move {
            let (mut reader, mut writer) = tokio::io::split(remote);
            let codec = MessageCodec::default();
            while let Some(message) = read_frame(&mut reader, &codec).await {
                let frame = codec.encode(&message).unwrap();
                if writer.write_all(&frame).await.is_err() {
                    return;
                }
            }
        });
        local
    }

    /// Requests of one type received from the SDK, in arrival order
    pub fn received(&self, message_type: MessageType) -> Vec<ProxyMessage> {
        self.shared
            .state
            .lock()
            .received
            .iter()
            .filter(|m| m.message_type == message_type)
            .cloned()
            .collect()
    }

    pub fn count(&self, message_type: MessageType) -> usize {
        self.received(message_type).len()
    }

    /// Answer every request of this type with `error` from now on
    pub fn fail(&self, message_type: MessageType, error: ProxyError) {
        self.shared.state.lock().failures.insert(message_type, error);
    }

    /// Answer the next `successes` requests of this type normally and
    /// every later one with `error`
    pub fn fail_after(&self, message_type: MessageType, successes: usize, error: ProxyError) {
        self.shared
            .state
            .lock()
            .failures_after
            .insert(message_type, (successes, error));
    }

    pub fn set_answer_heartbeats(&self, answer: bool) {
        self.shared.answer_heartbeats.store(answer, Ordering::SeqCst);
    }

    /// How many times an activity is attempted before its failure is
    /// reported to the workflow. Attempts share one activity id.
    pub fn set_activity_attempts(&self, attempts: usize) {
        self.shared.state.lock().activity_attempts = attempts.max(1);
    }

    pub fn workers(&self) -> Vec<FakeWorker> {
        self.shared.state.lock().workers.values().cloned().collect()
    }

    /// Last size set through `SetCacheSize`
    pub fn cache_size(&self) -> Option<i32> {
        self.shared.state.lock().cache_size
    }

    /// Markers persisted for an execution
    pub fn history(&self, workflow_id: &str) -> Vec<ReplayMarker> {
        self.shared
            .state
            .lock()
            .histories
            .get(workflow_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Close the proxy side of the pipe
    pub fn hang_up(&self) {
        let _ = self.shared.outbound.send(Outbound::HangUp);
    }

    /// Send a frame exactly as given
    pub fn send_raw(&self, message: ProxyMessage) {
        self.shared.send(message);
    }

    /// Send a proxy-initiated request and wait for the SDK's reply
    pub async fn invoke<R: ProxyRequest>(&self, request: R) -> R::Reply {
        let reply = self.shared.invoke(request.into_message().unwrap()).await;
        R::Reply::try_from_message(reply).unwrap()
    }

    /// Request id of the most recent proxy-initiated request
    pub fn last_invocation_id(&self) -> u32 {
        self.shared.next_request_id.load(Ordering::SeqCst) - 1
    }

    /// Wait until an invocation of `workflow_id` is out and return its
    /// client and context ids
    pub async fn wait_until_running(&self, workflow_id: &str) -> (u32, i64) {
        loop {
            let running = self.shared.state.lock().running.get(workflow_id).copied();
            if let Some(running) = running {
                return running;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Wait until an activity of `activity_type` is out and return its
    /// client and context ids
    pub async fn wait_until_activity_running(&self, activity_type: &str) -> (u32, i64) {
        loop {
            let running = self
                .shared
                .state
                .lock()
                .running_activities
                .get(activity_type)
                .copied();
            if let Some(running) = running {
                return running;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Wait until an activity has deferred its completion and return its
    /// task token and activity id
    pub async fn wait_until_deferred(&self) -> (Vec<u8>, String) {
        loop {
            let deferred = self
                .shared
                .state
                .lock()
                .deferred
                .first()
                .map(|d| (d.task_token.clone(), d.activity_id.clone()));
            if let Some(deferred) = deferred {
                return deferred;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Re-deliver a finished execution with its recorded markers
    pub async fn replay_workflow(&self, workflow_id: &str) -> Result<Option<Vec<u8>>, ProxyError> {
        let execution = self.shared.state.lock().executions.get(workflow_id).cloned();
        let execution = execution.ok_or_else(|| ProxyError::generic("unknown execution"))?;
        let history = self.history(workflow_id);
        self.shared.run_workflow(execution, Some(history)).await
    }
}

impl Shared {
    fn send(&self, message: ProxyMessage) {
        let _ = self.outbound.send(Outbound::Frame(message));
    }

    fn allocate_request_id(&self) -> u32 {
        self.next_request_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn invoke(&self, message: ProxyMessage) -> ProxyMessage {
        self.invoke_as(self.allocate_request_id(), message).await
    }

    async fn invoke_as(&self, request_id: u32, mut message: ProxyMessage) -> ProxyMessage {
        message.set_request_id(request_id);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id, tx);
        self.send(message);
        rx.await.expect("SDK never answered the invocation")
    }

    fn scripted_failure(&self, message_type: MessageType) -> Option<ProxyError> {
        let mut state = self.state.lock();
        if let Some(error) = state.failures.get(&message_type) {
            return Some(error.clone());
        }
        match state.failures_after.get_mut(&message_type) {
            Some((0, error)) => Some(error.clone()),
            Some((remaining, _)) => {
                *remaining -= 1;
                None
            }
            None => None,
        }
    }

    async fn respond(self: Arc<Self>, request: ProxyMessage) {
        self.state.lock().received.push(request.clone());
        let failure = self.scripted_failure(request.message_type);
        if request.message_type == MessageType::HeartbeatRequest
            && !self.answer_heartbeats.load(Ordering::SeqCst)
        {
            return;
        }

        let request_id = request.request_id().unwrap();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.inflight.lock().insert(request_id, cancel_tx);
        let mut reply = match failure {
            Some(error) => error_reply(&request, error),
            None => tokio::select! {
                reply = self.handle(&request) => reply,
                Ok(()) = cancel_rx => error_reply(&request, ProxyError::cancelled("request cancelled")),
            },
        };
        self.inflight.lock().remove(&request_id);
        reply.set_request_id(request_id);
        reply.set_client_id(request.client_id().unwrap());
        self.send(reply);
    }

    async fn handle(&self, request: &ProxyMessage) -> ProxyMessage {
        let client_id = request.client_id().unwrap();
        match request.message_type {
            MessageType::WorkflowRegisterRequest => {
                let request = WorkflowRegisterRequest::try_from_message(request.clone()).unwrap();
                self.state
                    .lock()
                    .workflows
                    .push((client_id, request.name.clone().unwrap_or_default()));
                ack(request)
            }
            MessageType::ActivityRegisterRequest => {
                let request = ActivityRegisterRequest::try_from_message(request.clone()).unwrap();
                self.state
                    .lock()
                    .activities
                    .push((client_id, request.name.clone().unwrap_or_default()));
                ack(request)
            }
            MessageType::NewWorkerRequest => {
                let request = NewWorkerRequest::try_from_message(request.clone()).unwrap();
                let mut state = self.state.lock();
                let worker_id = state.next_worker_id;
                state.next_worker_id += 1;
                state.workers.insert(
                    worker_id,
                    FakeWorker {
                        client_id,
                        namespace: request.namespace.unwrap_or_default(),
                        task_queue: request.task_queue.unwrap_or_default(),
                        kind: request.kind.unwrap_or(WorkerKind::Both),
                        started: false,
                        started_at: None,
                    },
                );
                NewWorkerReply {
                    worker_id: Some(worker_id),
                    ..Default::default()
                }
                .into_message()
                .unwrap()
            }
            MessageType::StartWorkerRequest => {
                let request = StartWorkerRequest::try_from_message(request.clone()).unwrap();
                let worker_id = request.worker_id.unwrap_or_default();
                match self.state.lock().workers.get_mut(&worker_id) {
                    Some(worker) => {
                        worker.started = true;
                        worker.started_at = Some(Utc::now());
                        ack(request)
                    }
                    None => error_reply(
                        &request.into_message().unwrap(),
                        ProxyError::generic(format!("unknown worker {}", worker_id)),
                    ),
                }
            }
            MessageType::StopWorkerRequest => {
                let request = StopWorkerRequest::try_from_message(request.clone()).unwrap();
                self.state
                    .lock()
                    .workers
                    .remove(&request.worker_id.unwrap_or_default());
                ack(request)
            }
            MessageType::SetCacheSizeRequest => {
                let request = SetCacheSizeRequest::try_from_message(request.clone()).unwrap();
                self.state.lock().cache_size = request.size;
                ack(request)
            }
            MessageType::CancelRequest => {
                let request = CancelRequest::try_from_message(request.clone()).unwrap();
                let target = self
                    .inflight
                    .lock()
                    .remove(&request.target_request_id.unwrap_or_default());
                CancelReply {
                    was_cancelled: Some(target.map_or(false, |tx| tx.send(()).is_ok())),
                    ..Default::default()
                }
                .into_message()
                .unwrap()
            }
            MessageType::NamespaceRegisterRequest
            | MessageType::NamespaceDescribeRequest
            | MessageType::NamespaceUpdateRequest
            | MessageType::NamespaceDeprecateRequest
            | MessageType::NamespaceListRequest
            | MessageType::DescribeTaskQueueRequest => self.handle_namespace(request),
            MessageType::WorkflowExecuteRequest => {
                let request = WorkflowExecuteRequest::try_from_message(request.clone()).unwrap();
                let execution = self.register_execution(
                    request.workflow_id,
                    request.workflow.unwrap_or_default(),
                    request.namespace.unwrap_or_default(),
                    request.task_queue.unwrap_or_default(),
                    request.args,
                );
                WorkflowExecuteReply {
                    workflow_id: Some(execution.workflow_id),
                    run_id: Some(execution.run_id),
                    ..Default::default()
                }
                .into_message()
                .unwrap()
            }
            MessageType::WorkflowSignalWithStartRequest => {
                let request =
                    WorkflowSignalWithStartRequest::try_from_message(request.clone()).unwrap();
                let workflow_id = request.workflow_id.clone().unwrap_or_default();
                let known = self.state.lock().executions.get(&workflow_id).cloned();
                let execution = match known {
                    Some(execution) if execution.status == WorkflowExecutionStatus::Running => {
                        execution
                    }
                    _ => self.register_execution(
                        Some(workflow_id.clone()),
                        request.workflow.clone().unwrap_or_default(),
                        request.namespace.clone().unwrap_or_default(),
                        request.task_queue.clone().unwrap_or_default(),
                        request.args.clone(),
                    ),
                };
                let outcome = self
                    .signal(&workflow_id, request.signal_name.clone(), request.signal_args.clone())
                    .await;
                result_reply(request.into_message().unwrap(), outcome, |_| {
                    WorkflowSignalWithStartReply {
                        workflow_id: Some(execution.workflow_id),
                        run_id: Some(execution.run_id),
                        ..Default::default()
                    }
                })
            }
            MessageType::WorkflowDescribeExecutionRequest => {
                let request =
                    WorkflowDescribeExecutionRequest::try_from_message(request.clone()).unwrap();
                let workflow_id = request.workflow_id.clone().unwrap_or_default();
                let state = self.state.lock();
                match state.executions.get(&workflow_id) {
                    Some(execution) => WorkflowDescribeExecutionReply {
                        details: Some(WorkflowExecutionDescription {
                            workflow_id: execution.workflow_id.clone(),
                            run_id: execution.run_id.clone(),
                            workflow_type: execution.workflow_type.clone(),
                            task_queue: execution.task_queue.clone(),
                            status: execution.status,
                            start_time: execution.start_time,
                            close_time: execution.close_time,
                            history_length: state
                                .histories
                                .get(&workflow_id)
                                .map_or(0, |h| h.len() as i64),
                        }),
                        ..Default::default()
                    }
                    .into_message()
                    .unwrap(),
                    None => error_reply(
                        &request.into_message().unwrap(),
                        ProxyError::generic(format!("unknown workflow '{}'", workflow_id)),
                    ),
                }
            }
            MessageType::WorkflowGetResultRequest => {
                let request = WorkflowGetResultRequest::try_from_message(request.clone()).unwrap();
                let workflow_id = request.workflow_id.clone().unwrap_or_default();
                let execution = self.state.lock().executions.get(&workflow_id).cloned();
                let outcome = match execution {
                    Some(execution) => self.run_workflow(execution, None).await,
                    None => Err(ProxyError::generic(format!(
                        "unknown workflow '{}'",
                        workflow_id
                    ))),
                };
                result_reply(
                    request.into_message().unwrap(),
                    outcome,
                    |result| WorkflowGetResultReply {
                        result,
                        ..Default::default()
                    },
                )
            }
            MessageType::WorkflowExecuteChildRequest => {
                let request =
                    WorkflowExecuteChildRequest::try_from_message(request.clone()).unwrap();
                let execution = self.register_execution(
                    request.workflow_id.clone(),
                    request.workflow.clone().unwrap_or_default(),
                    request.namespace.clone().unwrap_or_default(),
                    request.task_queue.clone().unwrap_or_default(),
                    request.args.clone(),
                );
                let outcome = self.run_workflow(execution, None).await;
                result_reply(request.into_message().unwrap(), outcome, |result| {
                    WorkflowExecuteChildReply {
                        result,
                        ..Default::default()
                    }
                })
            }
            MessageType::ActivityExecuteRequest => {
                let request = ActivityExecuteRequest::try_from_message(request.clone()).unwrap();
                let outcome = self.run_activity(&request).await;
                result_reply(request.into_message().unwrap(), outcome, |result| {
                    ActivityExecuteReply {
                        result,
                        ..Default::default()
                    }
                })
            }
            MessageType::ActivityExecuteLocalRequest => {
                let request =
                    ActivityExecuteLocalRequest::try_from_message(request.clone()).unwrap();
                let outcome = self.run_local_activity(client_id, &request).await;
                result_reply(request.into_message().unwrap(), outcome, |result| {
                    ActivityExecuteLocalReply {
                        result,
                        ..Default::default()
                    }
                })
            }
            MessageType::ActivityRecordHeartbeatRequest => {
                let request =
                    ActivityRecordHeartbeatRequest::try_from_message(request.clone()).unwrap();
                let mut state = self.state.lock();
                let activity_id = state
                    .activity_ids
                    .get(&request.context_id.unwrap_or_default())
                    .cloned();
                if let (Some(activity_id), Some(details)) = (activity_id, request.details.clone()) {
                    state.heartbeat_details.insert(activity_id, details);
                }
                ack(request)
            }
            MessageType::ActivityGetHeartbeatDetailsRequest => {
                let request =
                    ActivityGetHeartbeatDetailsRequest::try_from_message(request.clone()).unwrap();
                let details = self.heartbeat_details(request.context_id);
                ActivityGetHeartbeatDetailsReply {
                    details,
                    ..Default::default()
                }
                .into_message()
                .unwrap()
            }
            MessageType::ActivityHasHeartbeatDetailsRequest => {
                let request =
                    ActivityHasHeartbeatDetailsRequest::try_from_message(request.clone()).unwrap();
                let has_details = self.heartbeat_details(request.context_id).is_some();
                ActivityHasHeartbeatDetailsReply {
                    has_details: Some(has_details),
                    ..Default::default()
                }
                .into_message()
                .unwrap()
            }
            MessageType::ActivityCompleteRequest => {
                let request = ActivityCompleteRequest::try_from_message(request.clone()).unwrap();
                let deferred = {
                    let mut state = self.state.lock();
                    let position = state.deferred.iter().position(|d| match &request.task_token {
                        Some(token) => d.task_token == *token,
                        None => Some(&d.activity_id) == request.activity_id.as_ref(),
                    });
                    position.map(|i| state.deferred.remove(i))
                };
                match deferred {
                    Some(deferred) => {
                        let outcome = match request.error.clone() {
                            Some(error) => Err(error),
                            None => Ok(request.result.clone()),
                        };
                        let _ = deferred.done.send(outcome);
                        ack(request)
                    }
                    None => error_reply(
                        &request.into_message().unwrap(),
                        ProxyError::generic("no activity is waiting for that completion"),
                    ),
                }
            }
            MessageType::WorkflowSignalRequest => {
                let request = WorkflowSignalRequest::try_from_message(request.clone()).unwrap();
                let workflow_id = request.workflow_id.clone().unwrap_or_default();
                let running = self.state.lock().running.contains_key(&workflow_id);
                let outcome = if running {
                    self.signal(&workflow_id, request.signal_name.clone(), request.signal_args.clone())
                        .await
                } else {
                    Err(ProxyError::generic("workflow is not running"))
                };
                result_reply(request.into_message().unwrap(), outcome, |_| {
                    WorkflowSignalReply::default()
                })
            }
            MessageType::WorkflowQueryRequest => {
                let request = WorkflowQueryRequest::try_from_message(request.clone()).unwrap();
                let running = self
                    .state
                    .lock()
                    .running
                    .get(request.workflow_id.as_deref().unwrap_or_default())
                    .copied();
                let outcome = match running {
                    Some((client_id, context_id)) => {
                        let reply = self
                            .invoke(
                                WorkflowQueryInvokeRequest {
                                    client_id,
                                    context_id: Some(context_id),
                                    query_name: request.query_name.clone(),
                                    query_args: request.query_args.clone(),
                                    ..Default::default()
                                }
                                .into_message()
                                .unwrap(),
                            )
                            .await;
                        reply_outcome(reply, |m| {
                            WorkflowQueryInvokeReply::try_from_message(m).unwrap().result
                        })
                    }
                    None => Err(ProxyError::generic("workflow is not running")),
                };
                result_reply(request.into_message().unwrap(), outcome, |result| {
                    WorkflowQueryReply {
                        result,
                        ..Default::default()
                    }
                })
            }
            MessageType::WorkflowMutableRequest => {
                let request = WorkflowMutableRequest::try_from_message(request.clone()).unwrap();
                let mut state = self.state.lock();
                let workflow = state.workflow_of_context(request.context_id.unwrap_or_default());
                if let (Some((workflow_id, _)), Some(marker)) = (workflow, request.marker.clone()) {
                    state.histories.entry(workflow_id).or_default().push(marker);
                }
                ack(request)
            }
            MessageType::WorkflowGetTimeRequest => WorkflowGetTimeReply {
                time: Some(Utc::now()),
                ..Default::default()
            }
            .into_message()
            .unwrap(),
            MessageType::WorkflowSleepRequest => {
                let request = WorkflowSleepRequest::try_from_message(request.clone()).unwrap();
                let duration = request.duration.and_then(|d| d.to_std().ok()).unwrap_or_default();
                tokio::time::sleep(duration).await;
                ack(request)
            }
            _ => ProxyMessage::reply_to(request).unwrap(),
        }
    }

    fn handle_namespace(&self, request: &ProxyMessage) -> ProxyMessage {
        let mut state = self.state.lock();
        let outcome: Result<ProxyMessage, ProxyError> = match request.message_type {
            MessageType::NamespaceRegisterRequest => {
                let request = NamespaceRegisterRequest::try_from_message(request.clone()).unwrap();
                let name = request.name.clone().unwrap_or_default();
                if state.namespaces.contains_key(&name) {
                    Err(ProxyError::generic(format!("namespace '{}' already exists", name)))
                } else {
                    state.namespaces.insert(
                        name.clone(),
                        NamespaceInfo {
                            name,
                            description: request.description.clone(),
                            status: NamespaceStatus::Registered,
                            owner_email: request.owner_email.clone(),
                            retention_days: request.retention_days,
                        },
                    );
                    Ok(ack(request))
                }
            }
            MessageType::NamespaceDescribeRequest => {
                let request = NamespaceDescribeRequest::try_from_message(request.clone()).unwrap();
                let name = request.name.clone().unwrap_or_default();
                match state.namespaces.get(&name) {
                    Some(info) => Ok(NamespaceDescribeReply {
                        info: Some(info.clone()),
                        ..Default::default()
                    }
                    .into_message()
                    .unwrap()),
                    None => Err(ProxyError::generic(format!("namespace '{}' not found", name))),
                }
            }
            MessageType::NamespaceUpdateRequest => {
                let request = NamespaceUpdateRequest::try_from_message(request.clone()).unwrap();
                let name = request.name.clone().unwrap_or_default();
                match state.namespaces.get_mut(&name) {
                    Some(info) => {
                        if request.description.is_some() {
                            info.description = request.description.clone();
                        }
                        if request.owner_email.is_some() {
                            info.owner_email = request.owner_email.clone();
                        }
                        if request.retention_days.is_some() {
                            info.retention_days = request.retention_days;
                        }
                        Ok(ack(request))
                    }
                    None => Err(ProxyError::generic(format!("namespace '{}' not found", name))),
                }
            }
            MessageType::NamespaceDeprecateRequest => {
                let request = NamespaceDeprecateRequest::try_from_message(request.clone()).unwrap();
                let name = request.name.clone().unwrap_or_default();
                match state.namespaces.get_mut(&name) {
                    Some(info) => {
                        info.status = NamespaceStatus::Deprecated;
                        Ok(ack(request))
                    }
                    None => Err(ProxyError::generic(format!("namespace '{}' not found", name))),
                }
            }
            MessageType::NamespaceListRequest => {
                let request = NamespaceListRequest::try_from_message(request.clone()).unwrap();
                // The page token is the decimal offset of the next page
                let start: usize = request
                    .next_page_token
                    .as_deref()
                    .and_then(|t| std::str::from_utf8(t).ok())
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(0);
                let page_size = request.page_size.unwrap_or(10).max(1) as usize;
                let all: Vec<NamespaceInfo> = state.namespaces.values().cloned().collect();
                let end = (start + page_size).min(all.len());
                let next = (end < all.len()).then(|| end.to_string().into_bytes());
                Ok(NamespaceListReply {
                    namespaces: Some(all[start.min(end)..end].to_vec()),
                    next_page_token: next,
                    ..Default::default()
                }
                .into_message()
                .unwrap())
            }
            _ => {
                let request = DescribeTaskQueueRequest::try_from_message(request.clone()).unwrap();
                let kind = request.kind.unwrap_or(WorkerKind::Both);
                let task_queue = request.name.clone().unwrap_or_default();
                let namespace = request.namespace.clone().unwrap_or_default();
                let pollers = state
                    .workers
                    .values()
                    .filter(|w| w.started && w.task_queue == task_queue && w.namespace == namespace)
                    .filter(|w| {
                        (kind.polls_workflows() && w.kind.polls_workflows())
                            || (kind.polls_activities() && w.kind.polls_activities())
                    })
                    .filter_map(|w| {
                        Some(PollerInfo {
                            identity: format!("client-{}@fake-proxy", w.client_id),
                            last_access_time: w.started_at?,
                            rate_per_second: 100_000.0,
                        })
                    })
                    .collect();
                Ok(DescribeTaskQueueReply {
                    pollers: Some(pollers),
                    ..Default::default()
                }
                .into_message()
                .unwrap())
            }
        };
        outcome.unwrap_or_else(|error| error_reply(request, error))
    }

    fn heartbeat_details(&self, context_id: Option<i64>) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let activity_id = state.activity_ids.get(&context_id.unwrap_or_default())?;
        state.heartbeat_details.get(activity_id).cloned()
    }

    fn register_execution(
        &self,
        workflow_id: Option<String>,
        workflow_type: String,
        namespace: String,
        task_queue: String,
        args: Option<Vec<u8>>,
    ) -> Execution {
        let mut state = self.state.lock();
        state.next_run += 1;
        let run = state.next_run;
        let execution = Execution {
            workflow_id: workflow_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("wf-{}", run)),
            run_id: format!("run-{}", run),
            workflow_type,
            namespace,
            task_queue,
            args,
            status: WorkflowExecutionStatus::Running,
            start_time: Utc::now(),
            close_time: None,
        };
        state
            .executions
            .insert(execution.workflow_id.clone(), execution.clone());
        execution
    }

    /// Deliver a signal to a running invocation, or hold it for the next
    /// one when the execution has not been delivered yet
    async fn signal(&self, workflow_id: &str, name: Option<String>, args: Option<Vec<u8>>) -> Outcome {
        let running = {
            let mut state = self.state.lock();
            let running = state.running.get(workflow_id).copied();
            if running.is_none() {
                state
                    .queued_signals
                    .entry(workflow_id.to_string())
                    .or_default()
                    .push((name.clone(), args.clone()));
            }
            running
        };
        match running {
            Some((client_id, context_id)) => self.invoke_signal(client_id, context_id, name, args).await,
            None => Ok(None),
        }
    }

    async fn invoke_signal(
        &self,
        client_id: u32,
        context_id: i64,
        name: Option<String>,
        args: Option<Vec<u8>>,
    ) -> Outcome {
        let reply = self
            .invoke(
                WorkflowSignalInvokeRequest {
                    client_id,
                    context_id: Some(context_id),
                    signal_name: name,
                    signal_args: args,
                    ..Default::default()
                }
                .into_message()
                .unwrap(),
            )
            .await;
        reply_outcome(reply, |_| None)
    }

    /// Hand queued signals to a fresh invocation once the SDK knows it
    async fn deliver_queued(&self, client_id: u32, context_id: i64, signals: Vec<(Option<String>, Option<Vec<u8>>)>) {
        for (name, args) in signals {
            for _ in 0..200 {
                let delivered = self
                    .invoke_signal(client_id, context_id, name.clone(), args.clone())
                    .await;
                if delivered.is_ok() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    }

    async fn run_workflow(&self, execution: Execution, history: Option<Vec<ReplayMarker>>) -> Outcome {
        // Allocated before the execution shows as running so that
        // `last_invocation_id` names this invocation
        let request_id = self.allocate_request_id();
        let (client_id, context_id, queued) = {
            let mut state = self.state.lock();
            let client_id = state
                .route(
                    &execution.task_queue,
                    WorkerKind::ActivityOnly,
                    &state.workflows,
                    &execution.workflow_type,
                )
                .ok_or_else(|| {
                    ProxyError::generic(format!(
                        "no worker hosts workflow '{}' on '{}'",
                        execution.workflow_type, execution.task_queue
                    ))
                })?;
            let context_id = state.next_context();
            state
                .running
                .insert(execution.workflow_id.clone(), (client_id, context_id));
            let queued = state
                .queued_signals
                .remove(&execution.workflow_id)
                .unwrap_or_default();
            (client_id, context_id, queued)
        };

        let replay_requested = history.is_some();
        let invocation = self.invoke_as(
            request_id,
            WorkflowInvokeRequest {
                client_id,
                context_id: Some(context_id),
                workflow: Some(execution.workflow_type.clone()),
                workflow_id: Some(execution.workflow_id.clone()),
                run_id: Some(execution.run_id.clone()),
                namespace: Some(execution.namespace.clone()),
                task_queue: Some(execution.task_queue.clone()),
                args: execution.args.clone(),
                history,
                replay_requested: Some(replay_requested),
                ..Default::default()
            }
            .into_message()
            .unwrap(),
        );
        let (reply, ()) = tokio::join!(invocation, self.deliver_queued(client_id, context_id, queued));

        let outcome = reply_outcome(reply, |m| WorkflowInvokeReply::try_from_message(m).unwrap().result);
        let mut state = self.state.lock();
        state.running.remove(&execution.workflow_id);
        if let Some(known) = state.executions.get_mut(&execution.workflow_id) {
            known.status = match &outcome {
                Ok(_) => WorkflowExecutionStatus::Completed,
                Err(_) => WorkflowExecutionStatus::Failed,
            };
            known.close_time = Some(Utc::now());
        }
        outcome
    }

    async fn run_activity(&self, request: &ActivityExecuteRequest) -> Outcome {
        let activity_type = request.activity.clone().unwrap_or_default();
        let task_queue = request.task_queue.clone().unwrap_or_default();
        let (client_id, attempts, activity_id, workflow_id) = {
            let mut state = self.state.lock();
            let client_id = state
                .route(&task_queue, WorkerKind::WorkflowOnly, &state.activities, &activity_type)
                .ok_or_else(|| {
                    ProxyError::generic(format!(
                        "no worker hosts activity '{}' on '{}'",
                        activity_type, task_queue
                    ))
                })?;
            let workflow_id = state
                .workflow_of_context(request.context_id.unwrap_or_default())
                .map(|(id, _)| id);
            let activity_id = format!("activity-{}", state.next_context());
            (client_id, state.activity_attempts, activity_id, workflow_id)
        };
        let task_token = format!("{}/{}", workflow_id.unwrap_or_default(), activity_id).into_bytes();

        let mut outcome = Err(ProxyError::generic("activity was never attempted"));
        for _ in 0..attempts {
            let context_id = {
                let mut state = self.state.lock();
                let context_id = state.next_context();
                state.activity_ids.insert(context_id, activity_id.clone());
                state
                    .running_activities
                    .insert(activity_type.clone(), (client_id, context_id));
                context_id
            };
            let reply = self
                .invoke(
                    ActivityInvokeRequest {
                        client_id,
                        context_id: Some(context_id),
                        activity: Some(activity_type.clone()),
                        activity_id: Some(activity_id.clone()),
                        namespace: request.namespace.clone(),
                        task_queue: Some(task_queue.clone()),
                        args: request.args.clone(),
                        task_token: Some(task_token.clone()),
                        ..Default::default()
                    }
                    .into_message()
                    .unwrap(),
                )
                .await;
            self.state.lock().running_activities.remove(&activity_type);

            let reply = ActivityInvokeReply::try_from_message(reply).unwrap();
            outcome = match reply.error {
                Some(error) => Err(error),
                None if reply.pending == Some(true) => {
                    let (done, completed) = oneshot::channel();
                    self.state.lock().deferred.push(Deferred {
                        task_token: task_token.clone(),
                        activity_id: activity_id.clone(),
                        done,
                    });
                    completed
                        .await
                        .unwrap_or_else(|_| Err(ProxyError::generic("completion dropped")))
                }
                None => Ok(reply.result),
            };
            if outcome.is_ok() {
                break;
            }
        }
        outcome
    }

    /// Local activities run on the client that hosts the calling workflow
    async fn run_local_activity(&self, client_id: u32, request: &ActivityExecuteLocalRequest) -> Outcome {
        let context_id = self.state.lock().next_context();
        let reply = self
            .invoke(
                ActivityInvokeLocalRequest {
                    client_id,
                    context_id: Some(context_id),
                    activity: request.activity.clone(),
                    activity_id: Some(format!("local-{}", context_id)),
                    args: request.args.clone(),
                    ..Default::default()
                }
                .into_message()
                .unwrap(),
            )
            .await;
        reply_outcome(reply, |m| ActivityInvokeLocalReply::try_from_message(m).unwrap().result)
    }
}

fn ack<T: TypedMessage>(request: T) -> ProxyMessage {
    ProxyMessage::reply_to(&request.into_message().unwrap()).unwrap()
}

fn error_reply(request: &ProxyMessage, error: ProxyError) -> ProxyMessage {
    let mut reply = ProxyMessage::reply_to(request).unwrap();
    reply.set_error(error).unwrap();
    reply
}

/// Split an SDK reply into its payload or its error
fn reply_outcome(reply: ProxyMessage, payload: impl FnOnce(ProxyMessage) -> Option<Vec<u8>>) -> Outcome {
    match reply.error().unwrap() {
        Some(error) => Err(error),
        None => Ok(payload(reply)),
    }
}

fn result_reply<T: TypedMessage>(
    request: ProxyMessage,
    outcome: Outcome,
    build: impl FnOnce(Option<Vec<u8>>) -> T,
) -> ProxyMessage {
    match outcome {
        Ok(result) => build(result).into_message().unwrap(),
        Err(error) => error_reply(&request, error),
    }
}

/// Read one frame, or `None` once the pipe is closed
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R, codec: &MessageCodec) -> Option<ProxyMessage> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    reader.read_exact(&mut prefix).await.ok()?;
    let mut frame = vec![0u8; codec.frame_length(prefix).ok()?];
    frame[..LENGTH_PREFIX_SIZE].copy_from_slice(&prefix);
    reader.read_exact(&mut frame[LENGTH_PREFIX_SIZE..]).await.ok()?;
    codec.decode(&frame).ok()
}

async fn read_loop<R: AsyncRead + Unpin>(mut reader: R, shared: Arc<Shared>) {
    let codec = MessageCodec::default();
    while let Some(message) = read_frame(&mut reader, &codec).await {
        if message.message_type.is_reply() {
            let waiter = shared.pending.lock().remove(&message.request_id().unwrap());
            if let Some(waiter) = waiter {
                let _ = waiter.send(message);
            }
        } else {
            tokio::spawn(Arc::clone(&shared).respond(message));
        }
    }
}

async fn write_loop(mut writer: WriteHalf<DuplexStream>, mut rx: mpsc::UnboundedReceiver<Outbound>) {
    let codec = MessageCodec::default();
    while let Some(outbound) = rx.recv().await {
        match outbound {
            Outbound::Frame(message) => {
                let frame = codec.encode(&message).unwrap();
                if writer.write_all(&frame).await.is_err() {
                    return;
                }
            }
            Outbound::HangUp => {
                let _ = writer.shutdown().await;
                return;
            }
        }
    }
}
