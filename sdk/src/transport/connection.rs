//! ProxyTransport - the single duplex channel to the proxy process

use super::handler::{CancelSignal, InboundHandler};
use super::log;
use crate::config::TransportConfig;
use crate::error::{Result, SdkError};
use durable_proxy_core::protocol::messages::{CancelReply, CancelRequest, LogReply, LogRequest};
use durable_proxy_core::protocol::LENGTH_PREFIX_SIZE;
use durable_proxy_core::{
    MessageCodec, MessageType, ProxyError, ProxyMessage, ProxyReply, ProxyRequest, TypedMessage,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

type ReplySender = oneshot::Sender<Result<ProxyMessage>>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Outstanding requests plus the connection-lost marker. Both live under
/// one lock so that a request can never be registered after the pending
/// table has been drained.
#[derive(Default)]
struct PendingState {
    requests: HashMap<u32, ReplySender>,
    lost: Option<String>,
}

/// Why the connection went away
#[derive(Debug, Clone, PartialEq, Eq)]
enum Loss {
    /// [`ProxyTransport::close`] was called
    Closed,
    Failed(String),
}

impl Loss {
    fn reason(&self) -> String {
        match self {
            Loss::Closed => "transport closed".to_string(),
            Loss::Failed(reason) => reason.clone(),
        }
    }

    /// A local close is routine and does not deserve an error log
    fn is_requested(&self) -> bool {
        matches!(self, Loss::Closed)
    }
}

struct Inner {
    codec: MessageCodec,
    config: TransportConfig,
    writer: tokio::sync::Mutex<BoxedWriter>,
    pending: Mutex<PendingState>,
    next_request_id: AtomicU32,
    handlers: RwLock<HashMap<MessageType, Arc<dyn InboundHandler>>>,
    /// Proxy-initiated requests still being handled, by their request id
    inbound: Mutex<HashMap<u32, CancelSignal>>,
    shutdown: watch::Sender<bool>,
}

/// Multiplexes concurrent requests over one byte stream to the proxy.
///
/// Frames are written under a single async lock so they never interleave;
/// callers wait on their own `RequestId` and are woken by a background
/// reader task. The same task hands proxy-initiated requests to the
/// handlers registered with [`ProxyTransport::register_handler`], answers
/// heartbeats, cancellation requests and log lines itself, and a second
/// task sends periodic heartbeats when enabled.
///
/// Cloning is cheap and yields another handle to the same connection.
#[derive(Clone)]
pub struct ProxyTransport {
    inner: Arc<Inner>,
}

impl ProxyTransport {
    /// Wrap a connected stream and start the background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<S>(stream: S, config: TransportConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (shutdown, _) = watch::channel(false);
        let inner = Arc::new(Inner {
            codec: MessageCodec::new(config.max_frame_size),
            config,
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            pending: Mutex::new(PendingState::default()),
            next_request_id: AtomicU32::new(1),
            handlers: RwLock::new(HashMap::new()),
            inbound: Mutex::new(HashMap::new()),
            shutdown,
        });

        tokio::spawn(read_loop(
            Arc::downgrade(&inner),
            reader,
            inner.codec,
            inner.shutdown.subscribe(),
        ));
        if inner.config.heartbeats_enabled() {
            tokio::spawn(heartbeat_loop(
                Arc::downgrade(&inner),
                inner.config.clone(),
                inner.shutdown.subscribe(),
            ));
        }

        debug!(
            heartbeat_interval = ?inner.config.heartbeat_interval,
            max_frame_size = inner.codec.max_frame_size(),
            "Proxy transport started"
        );
        Self { inner }
    }

    /// Connect to a proxy listening on a loopback TCP port
    pub async fn connect_tcp(addr: impl ToSocketAddrs, config: TransportConfig) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, config))
    }

    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    /// Install the handler for a proxy-initiated request type, replacing
    /// any previous one
    pub fn register_handler(&self, message_type: MessageType, handler: Arc<dyn InboundHandler>) {
        self.inner.handlers.write().insert(message_type, handler);
    }

    /// Send a typed request and wait for its typed reply.
    ///
    /// An `Error` in the reply becomes [`SdkError::RemoteFault`].
    pub async fn call<R: ProxyRequest>(&self, request: R) -> Result<R::Reply> {
        let reply = self.call_raw(request.into_message()?).await?;
        let reply = <R::Reply as TypedMessage>::try_from_message(reply)?;
        Ok(reply.into_result()?)
    }

    /// Send an untyped request. A fresh `RequestId` is assigned; the reply
    /// is returned as received, without checking its `Error`.
    pub async fn call_raw(&self, message: ProxyMessage) -> Result<ProxyMessage> {
        self.call_raw_with_timeout(message, self.inner.config.request_timeout)
            .await
    }

    pub async fn call_raw_with_timeout(
        &self,
        mut message: ProxyMessage,
        timeout: Option<Duration>,
    ) -> Result<ProxyMessage> {
        if !message.message_type.is_request() {
            return Err(SdkError::InvalidOperation(format!(
                "{} is a reply and cannot be sent as a request",
                message.message_type
            )));
        }

        let (tx, rx) = oneshot::channel();
        let request_id = self.inner.register_pending(tx)?;
        let _guard = PendingGuard {
            inner: &self.inner,
            request_id,
        };
        message.set_request_id(request_id);
        let message_type = message.message_type;
        self.inner.send(&message).await?;

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(SdkError::Timeout(format!(
                        "no reply to {} #{} within {:?}",
                        message_type, request_id, limit
                    )))
                }
            },
            None => rx.await,
        };
        match outcome {
            Ok(result) => result,
            Err(_) => Err(SdkError::ConnectionLost(self.inner.lost_reason())),
        }
    }

    /// Ask the proxy to cancel one of our outstanding requests. Returns the
    /// proxy's `WasCancelled` flag.
    pub async fn cancel(&self, target_request_id: u32) -> Result<bool> {
        let reply = self
            .call(CancelRequest {
                target_request_id: Some(target_request_id),
                ..Default::default()
            })
            .await?;
        Ok(reply.was_cancelled.unwrap_or(false))
    }

    pub fn is_connected(&self) -> bool {
        self.inner.pending.lock().lost.is_none()
    }

    /// Number of requests waiting for a reply
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.lock().requests.len()
    }

    /// Fail every pending request and stop the background tasks
    pub async fn close(&self) -> Result<()> {
        self.inner.mark_lost(Loss::Closed);
        let mut writer = self.inner.writer.lock().await;
        writer.shutdown().await?;
        info!("Proxy transport closed");
        Ok(())
    }
}

impl std::fmt::Debug for ProxyTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyTransport")
            .field("connected", &self.is_connected())
            .field("pending_requests", &self.pending_requests())
            .finish()
    }
}

/// Removes an abandoned request from the pending table
struct PendingGuard<'a> {
    inner: &'a Inner,
    request_id: u32,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.inner
            .pending
            .lock()
            .requests
            .remove(&self.request_id);
    }
}

impl Inner {
    fn register_pending(&self, tx: ReplySender) -> Result<u32> {
        let mut state = self.pending.lock();
        if let Some(reason) = &state.lost {
            return Err(SdkError::ConnectionLost(reason.clone()));
        }
        // Ids wrap; skip 0 (unset) and any id still outstanding.
        let request_id = loop {
            let candidate = self.next_request_id.fetch_add(1, Ordering::Relaxed);
            if candidate != 0 && !state.requests.contains_key(&candidate) {
                break candidate;
            }
        };
        state.requests.insert(request_id, tx);
        Ok(request_id)
    }

    fn lost_reason(&self) -> String {
        self.pending
            .lock()
            .lost
            .clone()
            .unwrap_or_else(|| "reply channel dropped".to_string())
    }

    async fn send(&self, message: &ProxyMessage) -> Result<()> {
        let frame = self.codec.encode(message)?;
        let mut writer = self.writer.lock().await;
        let written = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = written {
            drop(writer);
            let reason = format!("write failed: {}", e);
            self.mark_lost(Loss::Failed(reason.clone()));
            return Err(SdkError::ConnectionLost(reason));
        }
        Ok(())
    }

    /// Fail every pending request once and refuse new ones
    fn mark_lost(&self, loss: Loss) {
        let reason = loss.reason();
        let drained = {
            let mut state = self.pending.lock();
            if state.lost.is_some() {
                return;
            }
            state.lost = Some(reason.clone());
            std::mem::take(&mut state.requests)
        };
        if loss.is_requested() {
            debug!(pending = drained.len(), "Failing pending requests on close");
        } else {
            error!(reason = %reason, pending = drained.len(), "Proxy connection lost");
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(SdkError::ConnectionLost(reason.clone())));
        }
        for (_, signal) in self.inbound.lock().drain() {
            signal.cancel();
        }
        self.shutdown.send_replace(true);
    }

    fn complete(&self, reply: ProxyMessage) {
        let request_id = match reply.request_id() {
            Ok(id) => id,
            Err(e) => {
                warn!(message_type = %reply.message_type, error = %e, "Dropping reply with unreadable RequestId");
                return;
            }
        };
        let waiter = self.pending.lock().requests.remove(&request_id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(Ok(reply));
            }
            None => {
                warn!(
                    request_id,
                    message_type = %reply.message_type,
                    "{}",
                    SdkError::UnknownCorrelation(request_id)
                );
            }
        }
    }
}

async fn read_frame<R>(reader: &mut R, codec: &MessageCodec) -> Result<ProxyMessage>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    reader.read_exact(&mut prefix).await?;
    let total = codec.frame_length(prefix)?;
    let mut frame = vec![0u8; total];
    frame[..LENGTH_PREFIX_SIZE].copy_from_slice(&prefix);
    reader.read_exact(&mut frame[LENGTH_PREFIX_SIZE..]).await?;
    Ok(codec.decode(&frame)?)
}

async fn read_loop<S>(
    inner: Weak<Inner>,
    mut reader: ReadHalf<S>,
    codec: MessageCodec,
    mut shutdown: watch::Receiver<bool>,
) where
    S: AsyncRead + Send + 'static,
{
    loop {
        let frame = tokio::select! {
            frame = read_frame(&mut reader, &codec) => frame,
            _ = shutdown.changed() => return,
        };
        let Some(inner) = inner.upgrade() else {
            return;
        };
        match frame {
            Ok(message) if message.message_type.is_reply() => inner.complete(message),
            Ok(message) => dispatch_inbound(&inner, message),
            Err(SdkError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                inner.mark_lost(Loss::Failed("proxy closed the connection".to_string()));
                return;
            }
            Err(e) => {
                // The stream cannot be resynchronised after a bad frame.
                inner.mark_lost(Loss::Failed(format!("read failed: {}", e)));
                return;
            }
        }
    }
}

fn dispatch_inbound(inner: &Arc<Inner>, request: ProxyMessage) {
    let request_id = match request.request_id() {
        Ok(id) => id,
        Err(e) => {
            warn!(message_type = %request.message_type, error = %e, "Dropping request with unreadable RequestId");
            return;
        }
    };

    match request.message_type {
        MessageType::HeartbeatRequest => {
            spawn_reply(inner, ProxyMessage::reply_to(&request).map_err(Into::into));
        }
        MessageType::CancelRequest => {
            let reply = CancelRequest::try_from_message(request.clone())
                .map_err(SdkError::from)
                .and_then(|cancel| {
                    let target = cancel.target_request_id.unwrap_or(0);
                    let was_cancelled = match inner.inbound.lock().get(&target) {
                        Some(signal) => {
                            signal.cancel();
                            true
                        }
                        None => false,
                    };
                    debug!(target_request_id = target, was_cancelled, "Cancel requested by proxy");
                    Ok(CancelReply {
                        client_id: cancel.client_id,
                        request_id,
                        was_cancelled: Some(was_cancelled),
                        ..Default::default()
                    }
                    .into_message()?)
                });
            spawn_reply(inner, reply);
        }
        MessageType::LogRequest => {
            let reply = LogRequest::try_from_message(request.clone())
                .map_err(SdkError::from)
                .and_then(|log_request| {
                    log::forward(&log_request);
                    Ok(LogReply {
                        client_id: log_request.client_id,
                        request_id,
                        ..Default::default()
                    }
                    .into_message()?)
                });
            spawn_reply(inner, reply);
        }
        message_type => {
            let handler = inner.handlers.read().get(&message_type).cloned();
            let Some(handler) = handler else {
                error!(message_type = %message_type, "No handler registered for proxy request");
                inner.mark_lost(Loss::Failed(format!("no handler registered for {}", message_type)));
                return;
            };

            let signal = CancelSignal::new();
            inner.inbound.lock().insert(request_id, signal.clone());
            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                let mut reply = match handler.handle(request.clone(), signal).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        debug!(message_type = %request.message_type, error = %e, "Inbound request failed");
                        match error_reply(&request, e.to_proxy_error()) {
                            Ok(reply) => reply,
                            Err(e) => {
                                warn!(error = %e, "Cannot build error reply");
                                inner.inbound.lock().remove(&request_id);
                                return;
                            }
                        }
                    }
                };
                inner.inbound.lock().remove(&request_id);
                reply.set_request_id(request_id);
                if let Ok(client_id) = request.client_id() {
                    reply.set_client_id(client_id);
                }
                if let Err(e) = inner.send(&reply).await {
                    debug!(error = %e, "Reply not delivered");
                }
            });
        }
    }
}

fn error_reply(request: &ProxyMessage, error: ProxyError) -> Result<ProxyMessage> {
    let mut reply = ProxyMessage::reply_to(request)?;
    reply.set_error(error)?;
    Ok(reply)
}

fn spawn_reply(inner: &Arc<Inner>, reply: Result<ProxyMessage>) {
    match reply {
        Ok(reply) => {
            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                if let Err(e) = inner.send(&reply).await {
                    debug!(error = %e, "Reply not delivered");
                }
            });
        }
        Err(e) => warn!(error = %e, "Cannot answer proxy request"),
    }
}

async fn heartbeat_loop(
    inner: Weak<Inner>,
    config: TransportConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut missed = 0u32;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.heartbeat_interval) => {}
            _ = shutdown.changed() => return,
        }
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let transport = ProxyTransport { inner };
        let outcome = transport
            .call_raw_with_timeout(
                ProxyMessage::new(MessageType::HeartbeatRequest),
                Some(config.heartbeat_timeout),
            )
            .await;
        match outcome {
            Ok(_) => missed = 0,
            Err(SdkError::Timeout(_)) => {
                missed += 1;
                warn!(missed, max = config.max_missed_heartbeats, "Heartbeat reply missed");
                if missed > config.max_missed_heartbeats {
                    transport.inner.mark_lost(Loss::Failed(format!(
                        "{} consecutive heartbeats unanswered",
                        missed
                    )));
                    return;
                }
            }
            Err(SdkError::ConnectionLost(_)) => return,
            Err(e) => warn!(error = %e, "Heartbeat failed"),
        }
    }
}
