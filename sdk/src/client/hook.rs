//! Client hooks for observing dispatches
//!
//! A hook sees the fully resolved options of every workflow start, child
//! workflow start and activity execution just before the request is sent,
//! plus the outcome of every workflow run hosted by the client. Hooks are
//! called inline, so they should be quick.

use crate::options::{EffectiveActivityOptions, EffectiveChildOptions, EffectiveStartOptions};

/// Observer installed on a client when it is built
pub trait ClientHook: Send + Sync {
    /// A top-level workflow is about to be started
    fn on_workflow_start(&self, _client_id: u32, _options: &EffectiveStartOptions) {}

    /// A workflow hosted by this client is about to start a child
    fn on_child_workflow_start(
        &self,
        _client_id: u32,
        _parent_workflow_id: &str,
        _options: &EffectiveChildOptions,
    ) {
    }

    /// A workflow hosted by this client is about to run an activity
    fn on_activity_execute(
        &self,
        _client_id: u32,
        _workflow_id: &str,
        _options: &EffectiveActivityOptions,
    ) {
    }

    /// A workflow run delivered to this client returned successfully
    fn on_workflow_completed(&self, _client_id: u32, _workflow_type: &str, _workflow_id: &str) {}

    /// A workflow run delivered to this client failed
    fn on_workflow_failed(
        &self,
        _client_id: u32,
        _workflow_type: &str,
        _workflow_id: &str,
        _error: &str,
    ) {
    }
}

/// No-op hook implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpHook;

impl ClientHook for NoOpHook {}

/// Hook that delegates to several hooks in registration order
#[derive(Default)]
pub struct CompositeHook {
    hooks: Vec<Box<dyn ClientHook>>,
}

impl CompositeHook {
    pub fn new(hooks: Vec<Box<dyn ClientHook>>) -> Self {
        Self { hooks }
    }

    pub fn push(&mut self, hook: impl ClientHook + 'static) {
        self.hooks.push(Box::new(hook));
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl ClientHook for CompositeHook {
    fn on_workflow_start(&self, client_id: u32, options: &EffectiveStartOptions) {
        for hook in &self.hooks {
            hook.on_workflow_start(client_id, options);
        }
    }

    fn on_child_workflow_start(
        &self,
        client_id: u32,
        parent_workflow_id: &str,
        options: &EffectiveChildOptions,
    ) {
        for hook in &self.hooks {
            hook.on_child_workflow_start(client_id, parent_workflow_id, options);
        }
    }

    fn on_activity_execute(
        &self,
        client_id: u32,
        workflow_id: &str,
        options: &EffectiveActivityOptions,
    ) {
        for hook in &self.hooks {
            hook.on_activity_execute(client_id, workflow_id, options);
        }
    }

    fn on_workflow_completed(&self, client_id: u32, workflow_type: &str, workflow_id: &str) {
        for hook in &self.hooks {
            hook.on_workflow_completed(client_id, workflow_type, workflow_id);
        }
    }

    fn on_workflow_failed(
        &self,
        client_id: u32,
        workflow_type: &str,
        workflow_id: &str,
        error: &str,
    ) {
        for hook in &self.hooks {
            hook.on_workflow_failed(client_id, workflow_type, workflow_id, error);
        }
    }
}

/// Hook that logs every dispatch
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHook {
    level: LogLevel,
}

/// Level [`LoggingHook`] logs at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    #[default]
    Debug,
    Info,
}

impl LoggingHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(level: LogLevel) -> Self {
        Self { level }
    }
}

macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            LogLevel::Trace => tracing::trace!($($arg)+),
            LogLevel::Debug => tracing::debug!($($arg)+),
            LogLevel::Info => tracing::info!($($arg)+),
        }
    };
}

impl ClientHook for LoggingHook {
    fn on_workflow_start(&self, client_id: u32, options: &EffectiveStartOptions) {
        log_at!(
            self.level,
            client_id,
            workflow_type = %options.workflow_type,
            namespace = %options.namespace,
            task_queue = %options.task_queue,
            "Starting workflow"
        );
    }

    fn on_child_workflow_start(
        &self,
        client_id: u32,
        parent_workflow_id: &str,
        options: &EffectiveChildOptions,
    ) {
        log_at!(
            self.level,
            client_id,
            parent_workflow_id,
            workflow_type = %options.workflow_type,
            namespace = %options.namespace,
            task_queue = %options.task_queue,
            "Starting child workflow"
        );
    }

    fn on_activity_execute(
        &self,
        client_id: u32,
        workflow_id: &str,
        options: &EffectiveActivityOptions,
    ) {
        log_at!(
            self.level,
            client_id,
            workflow_id,
            activity_type = %options.activity_type,
            task_queue = %options.task_queue,
            "Executing activity"
        );
    }

    fn on_workflow_completed(&self, client_id: u32, workflow_type: &str, workflow_id: &str) {
        log_at!(self.level, client_id, workflow_type, workflow_id, "Workflow completed");
    }

    fn on_workflow_failed(
        &self,
        client_id: u32,
        workflow_type: &str,
        workflow_id: &str,
        error: &str,
    ) {
        tracing::warn!(client_id, workflow_type, workflow_id, error, "Workflow failed");
    }
}
