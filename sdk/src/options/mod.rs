//! Option resolution for workflow starts, child workflows and activities
//!
//! Every field is resolved on its own by taking the first tier that sets it:
//!
//! 1. options passed at the call site
//! 2. attributes of the method being invoked
//! 3. attributes of the workflow or activity type
//! 4. the parent workflow (namespace and task queue of children and activities only)
//! 5. the client's [`ClientSettings`]
//!
//! Empty strings and zero durations count as unset, so a tier can leave a
//! field to the tiers below it.

use crate::config::ClientSettings;
use crate::error::{Result, SdkError};
use durable_proxy_core::WorkflowIdReusePolicy;
use std::time::Duration;

/// Options given when starting a workflow or a child workflow
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartWorkflowOptions {
    /// Workflow id; the proxy generates one when absent
    pub workflow_id: Option<String>,
    pub namespace: Option<String>,
    pub task_queue: Option<String>,
    pub execution_timeout: Option<Duration>,
    pub run_timeout: Option<Duration>,
    pub task_timeout: Option<Duration>,
    pub id_reuse_policy: Option<WorkflowIdReusePolicy>,
}

/// Child workflows take the same per-call options as top-level starts
pub type ChildWorkflowOptions = StartWorkflowOptions;

impl StartWorkflowOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workflow_id(mut self, id: impl Into<String>) -> Self {
        self.workflow_id = Some(id.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn task_queue(mut self, task_queue: impl Into<String>) -> Self {
        self.task_queue = Some(task_queue.into());
        self
    }

    pub fn execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = Some(timeout);
        self
    }

    pub fn run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    pub fn task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    pub fn id_reuse_policy(mut self, policy: WorkflowIdReusePolicy) -> Self {
        self.id_reuse_policy = Some(policy);
        self
    }
}

/// Options given when scheduling an activity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityOptions {
    pub namespace: Option<String>,
    pub task_queue: Option<String>,
    pub schedule_to_close_timeout: Option<Duration>,
    pub schedule_to_start_timeout: Option<Duration>,
    pub start_to_close_timeout: Option<Duration>,
    pub heartbeat_timeout: Option<Duration>,
}

impl ActivityOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn task_queue(mut self, task_queue: impl Into<String>) -> Self {
        self.task_queue = Some(task_queue.into());
        self
    }

    pub fn schedule_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.schedule_to_close_timeout = Some(timeout);
        self
    }

    pub fn schedule_to_start_timeout(mut self, timeout: Duration) -> Self {
        self.schedule_to_start_timeout = Some(timeout);
        self
    }

    pub fn start_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.start_to_close_timeout = Some(timeout);
        self
    }

    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = Some(timeout);
        self
    }
}

/// Option defaults declared on a workflow type or on its run method.
///
/// The same shape serves both tiers; see
/// [`WorkflowDefinition`](crate::workflow::WorkflowDefinition).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowAttributes {
    pub namespace: Option<String>,
    pub task_queue: Option<String>,
    pub execution_timeout: Option<Duration>,
    pub run_timeout: Option<Duration>,
    pub task_timeout: Option<Duration>,
    pub id_reuse_policy: Option<WorkflowIdReusePolicy>,
}

impl WorkflowAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn task_queue(mut self, task_queue: impl Into<String>) -> Self {
        self.task_queue = Some(task_queue.into());
        self
    }

    pub fn execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = Some(timeout);
        self
    }

    pub fn run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    pub fn task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    pub fn id_reuse_policy(mut self, policy: WorkflowIdReusePolicy) -> Self {
        self.id_reuse_policy = Some(policy);
        self
    }
}

/// Option defaults declared on an activity type or on its run method
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityAttributes {
    pub namespace: Option<String>,
    pub task_queue: Option<String>,
    pub schedule_to_close_timeout: Option<Duration>,
    pub schedule_to_start_timeout: Option<Duration>,
    pub start_to_close_timeout: Option<Duration>,
    pub heartbeat_timeout: Option<Duration>,
}

impl ActivityAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn task_queue(mut self, task_queue: impl Into<String>) -> Self {
        self.task_queue = Some(task_queue.into());
        self
    }

    pub fn schedule_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.schedule_to_close_timeout = Some(timeout);
        self
    }

    pub fn schedule_to_start_timeout(mut self, timeout: Duration) -> Self {
        self.schedule_to_start_timeout = Some(timeout);
        self
    }

    pub fn start_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.start_to_close_timeout = Some(timeout);
        self
    }

    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = Some(timeout);
        self
    }
}

/// A workflow type together with the attribute tiers it declares
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowTarget {
    pub workflow_type: String,
    pub interface: WorkflowAttributes,
    pub method: WorkflowAttributes,
}

impl WorkflowTarget {
    /// A workflow addressed by name only, with no declared attributes
    pub fn named(workflow_type: impl Into<String>) -> Self {
        Self {
            workflow_type: workflow_type.into(),
            interface: WorkflowAttributes::default(),
            method: WorkflowAttributes::default(),
        }
    }

    pub fn of<W: crate::workflow::WorkflowDefinition>() -> Self {
        Self {
            workflow_type: W::WORKFLOW_TYPE.to_string(),
            interface: W::interface_attributes(),
            method: W::run_attributes(),
        }
    }
}

/// An activity type together with the attribute tiers it declares
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityTarget {
    pub activity_type: String,
    pub interface: ActivityAttributes,
    pub method: ActivityAttributes,
}

impl ActivityTarget {
    pub fn named(activity_type: impl Into<String>) -> Self {
        Self {
            activity_type: activity_type.into(),
            interface: ActivityAttributes::default(),
            method: ActivityAttributes::default(),
        }
    }

    pub fn of<A: crate::activity::ActivityDefinition>() -> Self {
        Self {
            activity_type: A::ACTIVITY_TYPE.to_string(),
            interface: A::interface_attributes(),
            method: A::run_attributes(),
        }
    }
}

/// Namespace and task queue of the workflow a child or activity is
/// scheduled from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentInfo {
    pub namespace: String,
    pub task_queue: String,
}

/// Fully resolved options for a workflow start
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveStartOptions {
    pub workflow_type: String,
    pub workflow_id: Option<String>,
    pub namespace: String,
    pub task_queue: String,
    pub execution_timeout: Duration,
    pub run_timeout: Duration,
    pub task_timeout: Duration,
    pub id_reuse_policy: WorkflowIdReusePolicy,
}

/// Fully resolved options for a child workflow
pub type EffectiveChildOptions = EffectiveStartOptions;

/// Fully resolved options for an activity
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveActivityOptions {
    pub activity_type: String,
    pub namespace: String,
    pub task_queue: String,
    pub schedule_to_close_timeout: Duration,
    pub schedule_to_start_timeout: Duration,
    pub start_to_close_timeout: Duration,
    pub heartbeat_timeout: Duration,
}

fn set_str(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

fn set_duration(value: &Option<Duration>) -> Option<Duration> {
    value.filter(|d| !d.is_zero())
}

fn first_str<'a>(tiers: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    tiers.into_iter().flatten().next().map(str::to_string)
}

fn first_duration(tiers: impl IntoIterator<Item = Option<Duration>>) -> Duration {
    tiers.into_iter().flatten().next().unwrap_or(Duration::ZERO)
}

/// Computes effective options against one client's defaults
#[derive(Debug, Clone)]
pub struct OptionsResolver {
    defaults: ClientSettings,
}

impl OptionsResolver {
    pub fn new(defaults: ClientSettings) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &ClientSettings {
        &self.defaults
    }

    /// Resolve a top-level workflow start
    pub fn resolve_start(
        &self,
        target: &WorkflowTarget,
        explicit: &StartWorkflowOptions,
    ) -> Result<EffectiveStartOptions> {
        self.resolve_workflow(target, explicit, None)
    }

    /// Resolve a child workflow started from `parent`
    pub fn resolve_child(
        &self,
        target: &WorkflowTarget,
        explicit: &ChildWorkflowOptions,
        parent: &ParentInfo,
    ) -> Result<EffectiveChildOptions> {
        self.resolve_workflow(target, explicit, Some(parent))
    }

    fn resolve_workflow(
        &self,
        target: &WorkflowTarget,
        explicit: &StartWorkflowOptions,
        parent: Option<&ParentInfo>,
    ) -> Result<EffectiveStartOptions> {
        let defaults = &self.defaults;
        let (method, interface) = (&target.method, &target.interface);

        let namespace = first_str([
            set_str(&explicit.namespace),
            set_str(&method.namespace),
            set_str(&interface.namespace),
            parent.map(|p| p.namespace.as_str()).filter(|s| !s.is_empty()),
            Some(defaults.namespace.as_str()),
        ])
        .unwrap_or_default();

        let task_queue = first_str([
            set_str(&explicit.task_queue),
            set_str(&method.task_queue),
            set_str(&interface.task_queue),
            parent.map(|p| p.task_queue.as_str()).filter(|s| !s.is_empty()),
            set_str(&defaults.task_queue),
        ])
        .ok_or_else(|| SdkError::MissingTaskQueue(format!("workflow '{}'", target.workflow_type)))?;

        Ok(EffectiveStartOptions {
            workflow_type: target.workflow_type.clone(),
            workflow_id: explicit.workflow_id.clone().filter(|id| !id.is_empty()),
            namespace,
            task_queue,
            execution_timeout: first_duration([
                set_duration(&explicit.execution_timeout),
                set_duration(&method.execution_timeout),
                set_duration(&interface.execution_timeout),
                Some(defaults.workflow_execution_timeout),
            ]),
            run_timeout: first_duration([
                set_duration(&explicit.run_timeout),
                set_duration(&method.run_timeout),
                set_duration(&interface.run_timeout),
                Some(defaults.workflow_run_timeout),
            ]),
            task_timeout: first_duration([
                set_duration(&explicit.task_timeout),
                set_duration(&method.task_timeout),
                set_duration(&interface.task_timeout),
                Some(defaults.workflow_task_timeout),
            ]),
            id_reuse_policy: explicit
                .id_reuse_policy
                .or(method.id_reuse_policy)
                .or(interface.id_reuse_policy)
                .unwrap_or(defaults.workflow_id_reuse_policy),
        })
    }

    /// Resolve an activity scheduled from `parent`
    pub fn resolve_activity(
        &self,
        target: &ActivityTarget,
        explicit: &ActivityOptions,
        parent: Option<&ParentInfo>,
    ) -> Result<EffectiveActivityOptions> {
        let defaults = &self.defaults;
        let (method, interface) = (&target.method, &target.interface);

        let namespace = first_str([
            set_str(&explicit.namespace),
            set_str(&method.namespace),
            set_str(&interface.namespace),
            parent.map(|p| p.namespace.as_str()).filter(|s| !s.is_empty()),
            Some(defaults.namespace.as_str()),
        ])
        .unwrap_or_default();

        let task_queue = first_str([
            set_str(&explicit.task_queue),
            set_str(&method.task_queue),
            set_str(&interface.task_queue),
            parent.map(|p| p.task_queue.as_str()).filter(|s| !s.is_empty()),
            set_str(&defaults.task_queue),
        ])
        .ok_or_else(|| SdkError::MissingTaskQueue(format!("activity '{}'", target.activity_type)))?;

        Ok(EffectiveActivityOptions {
            activity_type: target.activity_type.clone(),
            namespace,
            task_queue,
            schedule_to_close_timeout: first_duration([
                set_duration(&explicit.schedule_to_close_timeout),
                set_duration(&method.schedule_to_close_timeout),
                set_duration(&interface.schedule_to_close_timeout),
                Some(defaults.activity_schedule_to_close_timeout),
            ]),
            schedule_to_start_timeout: first_duration([
                set_duration(&explicit.schedule_to_start_timeout),
                set_duration(&method.schedule_to_start_timeout),
                set_duration(&interface.schedule_to_start_timeout),
                Some(defaults.activity_schedule_to_start_timeout),
            ]),
            start_to_close_timeout: first_duration([
                set_duration(&explicit.start_to_close_timeout),
                set_duration(&method.start_to_close_timeout),
                set_duration(&interface.start_to_close_timeout),
                Some(defaults.activity_start_to_close_timeout),
            ]),
            heartbeat_timeout: first_duration([
                set_duration(&explicit.heartbeat_timeout),
                set_duration(&method.heartbeat_timeout),
                set_duration(&interface.heartbeat_timeout),
                Some(defaults.activity_heartbeat_timeout),
            ]),
        })
    }
}
