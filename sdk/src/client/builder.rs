//! ProxyClient builder for fluent configuration

use crate::activity::ActivityDefinition;
use crate::client::hook::{ClientHook, CompositeHook, NoOpHook};
use crate::client::{ClientRegistry, ProxyClient};
use crate::config::ClientSettings;
use crate::error::Result;
use crate::worker::{ActivityRegistry, WorkflowRegistration};
use crate::workflow::WorkflowDefinition;
use durable_proxy_core::WorkflowIdReusePolicy;
use std::sync::Arc;
use std::time::Duration;

type DeferredActivity = Box<dyn FnOnce(&ActivityRegistry) -> Result<&'static str> + Send>;

/// Builder for connecting a [`ProxyClient`] with its registrations
///
/// Example:
/// ```ignore
/// let client = ProxyClientBuilder::new()
///     .host_port("localhost:7233")
///     .namespace("default")
///     .task_queue("q1")
///     .register_workflow(Workflow1)
///     .register_activity(SendEmail)
///     .build(&registry)
///     .await?;
/// ```
pub struct ProxyClientBuilder {
    settings: ClientSettings,
    hooks: Vec<Box<dyn ClientHook>>,
    workflows: Vec<WorkflowRegistration>,
    activities: Vec<DeferredActivity>,
}

impl Default for ProxyClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyClientBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::with_settings(ClientSettings::default())
    }

    pub fn with_settings(settings: ClientSettings) -> Self {
        Self {
            settings,
            hooks: Vec::new(),
            workflows: Vec::new(),
            activities: Vec::new(),
        }
    }

    /// Set the orchestration server endpoint
    pub fn host_port(mut self, host_port: impl Into<String>) -> Self {
        self.settings.host_port = host_port.into();
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.settings.namespace = namespace.into();
        self
    }

    /// Set the default task queue for workflows, activities and workers
    pub fn task_queue(mut self, task_queue: impl Into<String>) -> Self {
        self.settings.task_queue = Some(task_queue.into());
        self
    }

    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.settings.identity = Some(identity.into());
        self
    }

    /// Register the namespace on connect if it is missing
    ///
    /// Default: false
    pub fn create_namespace(mut self, create: bool) -> Self {
        self.settings.create_namespace = create;
        self
    }

    pub fn client_timeout(mut self, timeout: Duration) -> Self {
        self.settings.client_timeout = timeout;
        self
    }

    pub fn connect_retry(mut self, attempts: i32, delay: Duration) -> Self {
        self.settings.connect_retry_attempts = attempts;
        self.settings.connect_retry_delay = delay;
        self
    }

    pub fn workflow_timeouts(mut self, execution: Duration, run: Duration, task: Duration) -> Self {
        self.settings = self.settings.with_workflow_timeouts(execution, run, task);
        self
    }

    pub fn id_reuse_policy(mut self, policy: WorkflowIdReusePolicy) -> Self {
        self.settings.workflow_id_reuse_policy = policy;
        self
    }

    /// Register a hook that observes resolved options and workflow
    /// outcomes for this client
    pub fn register_hook(mut self, hook: impl ClientHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn register_workflow<W: WorkflowDefinition>(self, workflow: W) -> Self {
        self.register_workflow_registration(WorkflowRegistration::of(workflow))
    }

    pub fn register_workflow_registration(mut self, registration: WorkflowRegistration) -> Self {
        self.workflows.push(registration);
        self
    }

    pub fn register_activity<A: ActivityDefinition>(mut self, activity: A) -> Self {
        self.activities.push(Box::new(move |registry| {
            registry.register(activity)?;
            Ok(A::ACTIVITY_TYPE)
        }));
        self
    }

    fn hook(mut hooks: Vec<Box<dyn ClientHook>>) -> Arc<dyn ClientHook> {
        match hooks.len() {
            0 => Arc::new(NoOpHook),
            1 => Arc::from(hooks.remove(0)),
            _ => Arc::new(CompositeHook::new(hooks)),
        }
    }

    /// Connect the client and announce its registrations. Registration
    /// errors surface here.
    pub async fn build(self, registry: &ClientRegistry) -> Result<ProxyClient> {
        let hook = Self::hook(self.hooks);
        let client = registry.connect_with_hook(self.settings, hook).await?;

        for registration in self.workflows {
            client.register_workflow_registration(registration).await?;
        }
        for register in self.activities {
            let activity_type = register(&client.shared.activities)?;
            client.announce_activity(activity_type).await?;
        }
        Ok(client)
    }
}
