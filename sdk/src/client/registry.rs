//! ClientRegistry - the set of logical clients sharing one proxy transport

use super::proxy_client::{ClientShared, ProxyClient};
use crate::client::hook::{ClientHook, NoOpHook};
use crate::config::{ClientSettings, TransportConfig};
use crate::error::{Result, SdkError};
use crate::transport::ProxyTransport;
use crate::worker::dispatch::{self, ClientTable};
use durable_proxy_core::protocol::interval;
use durable_proxy_core::protocol::messages::{ConnectRequest, InitializeRequest, TerminateRequest};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::ToSocketAddrs;
use tokio::sync::OnceCell;
use tracing::level_filters::LevelFilter;
use tracing::{debug, info, warn};

/// Library name reported to the proxy on initialization
pub const LIBRARY_NAME: &str = "durable-proxy-sdk-rust";

/// Client ids are unique across every registry in the process
static NEXT_CLIENT_ID: AtomicU32 = AtomicU32::new(1);

fn next_client_id() -> u32 {
    loop {
        let id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
        // 0 means unset on the wire
        if id != 0 {
            return id;
        }
    }
}

/// Owns the proxy transport and hands out [`ProxyClient`]s over it.
///
/// The proxy is initialized once, on the first connect. Each connect then
/// opens a session with a client id no other registry in the process has
/// handed out; invocations the proxy sends for
/// that id are routed to the client's own registrations.
#[derive(Clone)]
pub struct ClientRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    transport: ProxyTransport,
    initialized: OnceCell<()>,
    clients: Arc<ClientTable>,
}

impl ClientRegistry {
    pub fn new(transport: ProxyTransport) -> Self {
        let clients: Arc<ClientTable> = Arc::new(parking_lot::RwLock::new(HashMap::new()));
        dispatch::install(&transport, Arc::downgrade(&clients));
        Self {
            inner: Arc::new(RegistryInner {
                transport,
                initialized: OnceCell::new(),
                clients,
            }),
        }
    }

    /// Connect to a proxy listening on a loopback TCP port
    pub async fn connect_tcp(addr: impl ToSocketAddrs, config: TransportConfig) -> Result<Self> {
        Ok(Self::new(ProxyTransport::connect_tcp(addr, config).await?))
    }

    pub fn transport(&self) -> &ProxyTransport {
        &self.inner.transport
    }

    /// Open a client session with default hooks
    pub async fn connect(&self, settings: ClientSettings) -> Result<ProxyClient> {
        self.connect_with_hook(settings, Arc::new(NoOpHook)).await
    }

    pub async fn connect_with_hook(
        &self,
        settings: ClientSettings,
        hook: Arc<dyn ClientHook>,
    ) -> Result<ProxyClient> {
        settings.validate()?;
        if !self.inner.transport.is_connected() {
            return Err(SdkError::ConnectionLost(
                "proxy transport is closed".to_string(),
            ));
        }
        self.initialize().await?;

        let client_id = next_client_id();
        self.inner
            .transport
            .call(ConnectRequest {
                client_id,
                host_port: Some(settings.host_port.clone()),
                identity: settings.identity.clone(),
                client_timeout: Some(interval(settings.client_timeout)?),
                namespace: Some(settings.namespace.clone()),
                create_namespace: Some(settings.create_namespace),
                retry_attempts: Some(settings.connect_retry_attempts),
                retry_delay: Some(interval(settings.connect_retry_delay)?),
                ..Default::default()
            })
            .await?;

        info!(
            client_id,
            namespace = %settings.namespace,
            task_queue = ?settings.task_queue,
            "Client connected"
        );
        let shared = Arc::new(ClientShared::new(
            client_id,
            settings,
            self.inner.transport.clone(),
            hook,
        ));
        self.inner
            .clients
            .write()
            .insert(client_id, Arc::clone(&shared));

        Ok(ProxyClient {
            shared,
            clients: Arc::clone(&self.inner.clients),
        })
    }

    async fn initialize(&self) -> Result<()> {
        self.inner
            .initialized
            .get_or_try_init(|| async {
                self.inner
                    .transport
                    .call(InitializeRequest {
                        library_name: Some(LIBRARY_NAME.to_string()),
                        library_version: Some(env!("CARGO_PKG_VERSION").to_string()),
                        log_level: Some(proxy_log_level(LevelFilter::current()).to_string()),
                        ..Default::default()
                    })
                    .await?;
                debug!(library_version = env!("CARGO_PKG_VERSION"), "Proxy initialized");
                Ok::<_, SdkError>(())
            })
            .await?;
        Ok(())
    }

    /// Ids of the clients currently connected
    pub fn client_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.inner.clients.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn client_count(&self) -> usize {
        self.inner.clients.read().len()
    }

    /// Ask the proxy to shut down and close the transport. Every client of
    /// this registry becomes unusable.
    pub async fn terminate(&self) -> Result<()> {
        let clients: Vec<_> = self.inner.clients.write().drain().map(|(_, c)| c).collect();
        for client in &clients {
            client.mark_disconnected();
        }

        match self.inner.transport.call(TerminateRequest::default()).await {
            Ok(_) => {}
            // The proxy may exit before its reply is flushed
            Err(SdkError::ConnectionLost(reason)) => {
                warn!(reason = %reason, "Connection lost while terminating proxy")
            }
            Err(e) => return Err(e),
        }
        self.inner.transport.close().await?;
        info!(clients = clients.len(), "Proxy terminated");
        Ok(())
    }
}

/// Log level the proxy should forward, from the subscriber's max level
fn proxy_log_level(filter: LevelFilter) -> &'static str {
    if filter == LevelFilter::OFF {
        "None"
    } else if filter == LevelFilter::ERROR {
        "Error"
    } else if filter == LevelFilter::WARN {
        "Warn"
    } else if filter == LevelFilter::INFO {
        "Info"
    } else {
        "Debug"
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("transport", &self.inner.transport)
            .field("clients", &self.client_ids())
            .finish()
    }
}
