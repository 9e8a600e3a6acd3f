//! Configuration for the proxy transport and for logical clients
//!
//! Both structs come with sensible defaults; [`TransportConfig`] also has
//! named presets for common setups.

use durable_proxy_core::protocol::DEFAULT_MAX_FRAME_SIZE;
use durable_proxy_core::WorkflowIdReusePolicy;
use std::time::Duration;

/// Settings for the shared byte channel to the proxy
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    /// Interval between outbound heartbeats; zero disables them
    pub heartbeat_interval: Duration,
    /// How long to wait for a heartbeat reply
    pub heartbeat_timeout: Duration,
    /// Consecutive missed heartbeats tolerated before the connection is
    /// declared lost
    pub max_missed_heartbeats: u32,
    /// Upper bound on any request/reply round trip; `None` waits forever
    pub request_timeout: Option<Duration>,
    /// Largest frame accepted or produced
    pub max_frame_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TransportConfig {
    /// Default configuration suitable for most use cases
    pub const DEFAULT: Self = Self {
        heartbeat_interval: Duration::from_secs(5),
        heartbeat_timeout: Duration::from_secs(5),
        max_missed_heartbeats: 3,
        request_timeout: Some(Duration::from_secs(60)),
        max_frame_size: DEFAULT_MAX_FRAME_SIZE,
    };

    /// For stepping through the proxy in a debugger: no heartbeats and no
    /// request timeout
    pub const DEBUG: Self = Self {
        heartbeat_interval: Duration::ZERO,
        heartbeat_timeout: Duration::from_secs(5),
        max_missed_heartbeats: 3,
        request_timeout: None,
        max_frame_size: DEFAULT_MAX_FRAME_SIZE,
    };

    /// Create a new configuration with validation
    pub fn new(
        heartbeat_interval: Duration,
        heartbeat_timeout: Duration,
        max_missed_heartbeats: u32,
        request_timeout: Option<Duration>,
    ) -> Result<Self, ConfigError> {
        if !heartbeat_interval.is_zero() && heartbeat_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "heartbeat_timeout must be positive when heartbeats are enabled".to_string(),
            ));
        }
        if request_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::InvalidValue(
                "request_timeout must be positive".to_string(),
            ));
        }

        Ok(Self {
            heartbeat_interval,
            heartbeat_timeout,
            max_missed_heartbeats,
            request_timeout,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        })
    }

    pub fn heartbeats_enabled(&self) -> bool {
        !self.heartbeat_interval.is_zero()
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Per-client connection settings and the lowest tier of option defaults
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    /// Orchestration server endpoint the proxy should dial
    pub host_port: String,
    /// Default namespace
    pub namespace: String,
    /// Default task queue; calls fail with `MissingTaskQueue` when nothing
    /// else supplies one
    pub task_queue: Option<String>,
    /// Identity reported to the server
    pub identity: Option<String>,
    /// Timeout for server calls made by the proxy
    pub client_timeout: Duration,
    /// Register the namespace on connect if it does not exist
    pub create_namespace: bool,
    /// Connection attempts made by the proxy before giving up
    pub connect_retry_attempts: i32,
    /// Delay between connection attempts
    pub connect_retry_delay: Duration,

    pub workflow_execution_timeout: Duration,
    pub workflow_run_timeout: Duration,
    pub workflow_task_timeout: Duration,
    pub workflow_id_reuse_policy: WorkflowIdReusePolicy,

    pub activity_schedule_to_close_timeout: Duration,
    pub activity_schedule_to_start_timeout: Duration,
    pub activity_start_to_close_timeout: Duration,
    /// Zero disables activity heartbeat timeouts
    pub activity_heartbeat_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            host_port: "localhost:7233".to_string(),
            namespace: "default".to_string(),
            task_queue: None,
            identity: None,
            client_timeout: Duration::from_secs(10),
            create_namespace: false,
            connect_retry_attempts: 3,
            connect_retry_delay: Duration::from_secs(5),
            workflow_execution_timeout: Duration::from_secs(24 * 60 * 60),
            workflow_run_timeout: Duration::from_secs(24 * 60 * 60),
            workflow_task_timeout: Duration::from_secs(10),
            workflow_id_reuse_policy: WorkflowIdReusePolicy::AllowDuplicate,
            activity_schedule_to_close_timeout: Duration::from_secs(24 * 60 * 60),
            activity_schedule_to_start_timeout: Duration::from_secs(24 * 60 * 60),
            activity_start_to_close_timeout: Duration::from_secs(24 * 60 * 60),
            activity_heartbeat_timeout: Duration::ZERO,
        }
    }
}

impl ClientSettings {
    /// Create settings for a server endpoint and namespace with validation
    pub fn new(
        host_port: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let settings = Self {
            host_port: host_port.into(),
            namespace: namespace.into(),
            ..Self::default()
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host_port.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "host_port must not be empty".to_string(),
            ));
        }
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "namespace must not be empty".to_string(),
            ));
        }
        if self.task_queue.as_deref().is_some_and(|q| q.trim().is_empty()) {
            return Err(ConfigError::InvalidValue(
                "task_queue must not be blank when set".to_string(),
            ));
        }
        if self.client_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "client_timeout must be positive".to_string(),
            ));
        }
        if self.connect_retry_attempts < 0 {
            return Err(ConfigError::InvalidValue(
                "connect_retry_attempts must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_task_queue(mut self, task_queue: impl Into<String>) -> Self {
        self.task_queue = Some(task_queue.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn with_create_namespace(mut self, create: bool) -> Self {
        self.create_namespace = create;
        self
    }

    pub fn with_workflow_timeouts(
        mut self,
        execution: Duration,
        run: Duration,
        task: Duration,
    ) -> Self {
        self.workflow_execution_timeout = execution;
        self.workflow_run_timeout = run;
        self.workflow_task_timeout = task;
        self
    }

    pub fn with_id_reuse_policy(mut self, policy: WorkflowIdReusePolicy) -> Self {
        self.workflow_id_reuse_policy = policy;
        self
    }
}

/// Configuration validation error
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
