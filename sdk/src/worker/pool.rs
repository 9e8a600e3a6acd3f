//! WorkerPool - deduplicated, reference-counted proxy workers
//!
//! One worker exists per (namespace, task queue, kind) within a client.
//! Asking for the same coordinates again returns the same handle and
//! bumps its reference count; the proxy registration is stopped only when
//! a dispose finds the count already at zero. The count then drops to -1
//! and the handle is permanently disposed.

use crate::error::{Result, SdkError};
use crate::transport::ProxyTransport;
use durable_proxy_core::protocol::messages::{
    NewWorkerRequest, StartWorkerRequest, StopWorkerRequest,
};
use durable_proxy_core::WorkerKind;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Deduplication key of a worker
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerKey {
    pub namespace: String,
    pub task_queue: String,
    pub kind: WorkerKind,
}

#[derive(Debug, Default)]
struct HandleState {
    ref_count: i32,
    started: bool,
    disposed: bool,
}

/// A worker registered with the proxy
#[derive(Debug)]
pub struct WorkerHandle {
    worker_id: i64,
    key: WorkerKey,
    state: Mutex<HandleState>,
}

impl WorkerHandle {
    pub fn worker_id(&self) -> i64 {
        self.worker_id
    }

    pub fn key(&self) -> &WorkerKey {
        &self.key
    }

    pub fn namespace(&self) -> &str {
        &self.key.namespace
    }

    pub fn task_queue(&self) -> &str {
        &self.key.task_queue
    }

    pub fn kind(&self) -> WorkerKind {
        self.key.kind
    }

    /// Extra owners beyond the first; -1 once disposed
    pub fn ref_count(&self) -> i32 {
        self.state.lock().ref_count
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    fn invalid(&self, what: &str) -> SdkError {
        SdkError::InvalidOperation(format!(
            "cannot {} worker {} ({}/{}/{:?})",
            what, self.worker_id, self.key.namespace, self.key.task_queue, self.key.kind
        ))
    }
}

/// Outcome of one [`WorkerPool::dispose`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposeOutcome {
    /// Other owners remain
    Released { ref_count: i32 },
    /// The proxy worker was stopped
    Stopped,
}

/// Workers of one client
pub struct WorkerPool {
    transport: ProxyTransport,
    client_id: u32,
    /// Async so that concurrent requests for the same key wait for the
    /// first `NewWorker` round trip instead of registering twice
    workers: tokio::sync::Mutex<HashMap<WorkerKey, Arc<WorkerHandle>>>,
}

impl WorkerPool {
    pub fn new(transport: ProxyTransport, client_id: u32) -> Self {
        Self {
            transport,
            client_id,
            workers: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Return the live worker for these coordinates, registering one with
    /// the proxy if there is none
    pub async fn get_or_create(
        &self,
        namespace: &str,
        task_queue: &str,
        kind: WorkerKind,
    ) -> Result<Arc<WorkerHandle>> {
        let key = WorkerKey {
            namespace: namespace.to_string(),
            task_queue: task_queue.to_string(),
            kind,
        };
        let mut workers = self.workers.lock().await;
        if let Some(handle) = workers.get(&key) {
            let mut state = handle.state.lock();
            if !state.disposed {
                state.ref_count += 1;
                debug!(
                    client_id = self.client_id,
                    worker_id = handle.worker_id,
                    ref_count = state.ref_count,
                    "Reusing worker"
                );
                return Ok(Arc::clone(handle));
            }
        }

        let reply = self
            .transport
            .call(NewWorkerRequest {
                client_id: self.client_id,
                namespace: Some(key.namespace.clone()),
                task_queue: Some(key.task_queue.clone()),
                kind: Some(kind),
                ..Default::default()
            })
            .await?;
        let worker_id = reply.worker_id.ok_or_else(|| {
            SdkError::MalformedMessage("NewWorkerReply without WorkerId".to_string())
        })?;

        let handle = Arc::new(WorkerHandle {
            worker_id,
            key: key.clone(),
            state: Mutex::new(HandleState::default()),
        });
        workers.insert(key, Arc::clone(&handle));
        info!(
            client_id = self.client_id,
            worker_id,
            namespace,
            task_queue,
            kind = ?kind,
            "Worker registered"
        );
        Ok(handle)
    }

    /// Start polling. Allowed once per handle.
    pub async fn start(&self, handle: &WorkerHandle) -> Result<()> {
        {
            let mut state = handle.state.lock();
            if state.disposed {
                return Err(handle.invalid("start disposed"));
            }
            if state.started {
                return Err(handle.invalid("restart"));
            }
            state.started = true;
        }

        let result = self
            .transport
            .call(StartWorkerRequest {
                client_id: self.client_id,
                worker_id: Some(handle.worker_id),
                ..Default::default()
            })
            .await;
        if let Err(e) = result {
            handle.state.lock().started = false;
            return Err(e);
        }
        info!(client_id = self.client_id, worker_id = handle.worker_id, "Worker started");
        Ok(())
    }

    /// Release one owner
    pub async fn dispose(&self, handle: &WorkerHandle) -> Result<DisposeOutcome> {
        {
            let mut state = handle.state.lock();
            if state.disposed {
                return Err(handle.invalid("dispose already disposed"));
            }
            if state.ref_count > 0 {
                state.ref_count -= 1;
                debug!(
                    client_id = self.client_id,
                    worker_id = handle.worker_id,
                    ref_count = state.ref_count,
                    "Worker released"
                );
                return Ok(DisposeOutcome::Released {
                    ref_count: state.ref_count,
                });
            }
            state.ref_count -= 1;
            state.disposed = true;
        }
        self.stop(handle).await?;
        Ok(DisposeOutcome::Stopped)
    }

    /// Stop every remaining worker regardless of its reference count
    pub async fn dispose_all(&self) -> Result<()> {
        let handles: Vec<_> = self.workers.lock().await.values().cloned().collect();
        let mut first_error = None;
        for handle in handles {
            {
                let mut state = handle.state.lock();
                if state.disposed {
                    continue;
                }
                state.disposed = true;
                state.ref_count = -1;
            }
            if let Err(e) = self.stop(&handle).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Live workers
    pub async fn len(&self) -> usize {
        self.workers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workers.lock().await.is_empty()
    }

    async fn stop(&self, handle: &WorkerHandle) -> Result<()> {
        {
            let mut workers = self.workers.lock().await;
            if workers
                .get(&handle.key)
                .is_some_and(|h| h.worker_id == handle.worker_id)
            {
                workers.remove(&handle.key);
            }
        }
        self.transport
            .call(StopWorkerRequest {
                client_id: self.client_id,
                worker_id: Some(handle.worker_id),
                ..Default::default()
            })
            .await?;
        info!(client_id = self.client_id, worker_id = handle.worker_id, "Worker stopped");
        Ok(())
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("client_id", &self.client_id)
            .finish()
    }
}
