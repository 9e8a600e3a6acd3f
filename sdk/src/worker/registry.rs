//! Registries of workflow and activity implementations hosted by a client

use crate::activity::{ActivityContext, ActivityDefinition};
use crate::error::{Result, SdkError};
use crate::workflow::{WorkflowContext, WorkflowDefinition};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

/// Type alias for boxed workflow execution functions
pub type BoxedWorkflowFn = Arc<
    dyn Fn(Arc<dyn WorkflowContext>, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync,
>;

/// Type alias for boxed activity execution functions
pub type BoxedActivityFn = Arc<
    dyn Fn(Arc<dyn ActivityContext>, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync,
>;

/// Workflow metadata sent to the proxy on registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowMetadata {
    /// Name the proxy delivers invocations under
    pub workflow_type: String,
    pub signals: Vec<String>,
    pub queries: Vec<String>,
}

/// A registered workflow entry point
pub struct RegisteredWorkflow {
    pub metadata: WorkflowMetadata,
    execute_fn: BoxedWorkflowFn,
}

impl RegisteredWorkflow {
    pub async fn execute(&self, ctx: Arc<dyn WorkflowContext>, input: Value) -> Result<Value> {
        (self.execute_fn)(ctx, input).await
    }
}

impl std::fmt::Debug for RegisteredWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredWorkflow")
            .field("metadata", &self.metadata)
            .field("execute_fn", &"<function>")
            .finish()
    }
}

/// Everything known about a workflow type before it is registered.
///
/// A type normally has a single unnamed entry point, delivered under the
/// type name. Additional named entry points are delivered as
/// `"{type}::{name}"`.
pub struct WorkflowRegistration {
    workflow_type: String,
    entry_points: Vec<(Option<String>, BoxedWorkflowFn)>,
    signals: Vec<String>,
    queries: Vec<String>,
}

impl WorkflowRegistration {
    pub fn new(workflow_type: impl Into<String>) -> Self {
        Self {
            workflow_type: workflow_type.into(),
            entry_points: Vec::new(),
            signals: Vec::new(),
            queries: Vec::new(),
        }
    }

    /// Registration for a typed workflow definition
    pub fn of<W: WorkflowDefinition>(workflow: W) -> Self {
        let workflow = Arc::new(workflow);
        let execute_fn: BoxedWorkflowFn = Arc::new(move |ctx, input| {
            let workflow = Arc::clone(&workflow);
            Box::pin(async move {
                let typed_input: W::Input = serde_json::from_value(input)?;
                let output = workflow.run(ctx.as_ref(), typed_input).await?;
                Ok(serde_json::to_value(output)?)
            })
        });

        let mut registration = Self::new(W::WORKFLOW_TYPE);
        registration.entry_points.push((None, execute_fn));
        registration.signals = W::SIGNALS.iter().map(|s| s.to_string()).collect();
        registration.queries = W::QUERIES.iter().map(|s| s.to_string()).collect();
        registration
    }

    /// Add an entry point; `None` is the default one
    pub fn entry_point<F, Fut>(mut self, name: Option<&str>, execute_fn: F) -> Self
    where
        F: Fn(Arc<dyn WorkflowContext>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let boxed: BoxedWorkflowFn = Arc::new(move |ctx, input| Box::pin(execute_fn(ctx, input)));
        self.entry_points.push((name.map(str::to_string), boxed));
        self
    }

    pub fn signal(mut self, name: impl Into<String>) -> Self {
        self.signals.push(name.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>) -> Self {
        self.queries.push(name.into());
        self
    }

    pub fn workflow_type(&self) -> &str {
        &self.workflow_type
    }

    /// Check the registration and expand it into one entry per delivered name
    fn validate(self) -> Result<Vec<RegisteredWorkflow>> {
        let workflow_type = self.workflow_type;
        if self.entry_points.is_empty() {
            return Err(SdkError::DuplicateRegistration(format!(
                "workflow '{}' has no entry point",
                workflow_type
            )));
        }
        let mut seen = HashSet::new();
        for (name, _) in &self.entry_points {
            if !seen.insert(name.clone()) {
                return Err(SdkError::DuplicateRegistration(format!(
                    "workflow '{}' has more than one entry point named {}",
                    workflow_type,
                    name.as_deref().map_or("<default>".to_string(), |n| format!("'{}'", n))
                )));
            }
        }
        check_unique(&workflow_type, "signal", &self.signals)?;
        check_unique(&workflow_type, "query", &self.queries)?;

        Ok(self
            .entry_points
            .into_iter()
            .map(|(name, execute_fn)| RegisteredWorkflow {
                metadata: WorkflowMetadata {
                    workflow_type: match name {
                        Some(name) => format!("{}::{}", workflow_type, name),
                        None => workflow_type.clone(),
                    },
                    signals: self.signals.clone(),
                    queries: self.queries.clone(),
                },
                execute_fn,
            })
            .collect())
    }
}

fn check_unique(workflow_type: &str, what: &str, names: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(SdkError::DuplicateRegistration(format!(
                "workflow '{}' declares {} '{}' more than once",
                workflow_type, what, name
            )));
        }
    }
    Ok(())
}

/// Registry for workflow implementations
#[derive(Default)]
pub struct WorkflowRegistry {
    workflows: RwLock<HashMap<String, Arc<RegisteredWorkflow>>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and add a registration. Nothing is added if any of its
    /// names is already taken.
    pub fn register(&self, registration: WorkflowRegistration) -> Result<Vec<WorkflowMetadata>> {
        let entries = registration.validate()?;
        let mut workflows = self.workflows.write();
        if let Some(taken) = entries
            .iter()
            .find(|e| workflows.contains_key(&e.metadata.workflow_type))
        {
            return Err(SdkError::DuplicateRegistration(format!(
                "workflow '{}' is already registered",
                taken.metadata.workflow_type
            )));
        }
        let metadata = entries.iter().map(|e| e.metadata.clone()).collect();
        for entry in entries {
            workflows.insert(entry.metadata.workflow_type.clone(), Arc::new(entry));
        }
        Ok(metadata)
    }

    /// Remove entries added by a registration the proxy rejected
    pub fn unregister(&self, workflow_type: &str) {
        self.workflows.write().remove(workflow_type);
    }

    pub fn get(&self, workflow_type: &str) -> Option<Arc<RegisteredWorkflow>> {
        self.workflows.read().get(workflow_type).cloned()
    }

    pub fn has(&self, workflow_type: &str) -> bool {
        self.workflows.read().contains_key(workflow_type)
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.workflows.read().keys().cloned().collect()
    }
}

/// A registered activity
pub struct RegisteredActivity {
    pub activity_type: String,
    execute_fn: BoxedActivityFn,
}

impl RegisteredActivity {
    pub async fn execute(&self, ctx: Arc<dyn ActivityContext>, input: Value) -> Result<Value> {
        (self.execute_fn)(ctx, input).await
    }
}

impl std::fmt::Debug for RegisteredActivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredActivity")
            .field("activity_type", &self.activity_type)
            .field("execute_fn", &"<function>")
            .finish()
    }
}

/// Registry for activity implementations
#[derive(Default)]
pub struct ActivityRegistry {
    activities: RwLock<HashMap<String, Arc<RegisteredActivity>>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<A: ActivityDefinition>(&self, activity: A) -> Result<()> {
        let activity = Arc::new(activity);
        let execute_fn: BoxedActivityFn = Arc::new(move |ctx, input| {
            let activity = Arc::clone(&activity);
            Box::pin(async move {
                let typed_input: A::Input = serde_json::from_value(input)?;
                let output = activity.run(ctx.as_ref(), typed_input).await?;
                Ok(serde_json::to_value(output)?)
            })
        });
        self.register_raw(A::ACTIVITY_TYPE, execute_fn)
    }

    /// Register an untyped activity function
    pub fn register_fn<F, Fut>(&self, activity_type: &str, execute_fn: F) -> Result<()>
    where
        F: Fn(Arc<dyn ActivityContext>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.register_raw(
            activity_type,
            Arc::new(move |ctx, input| Box::pin(execute_fn(ctx, input))),
        )
    }

    fn register_raw(&self, activity_type: &str, execute_fn: BoxedActivityFn) -> Result<()> {
        let mut activities = self.activities.write();
        if activities.contains_key(activity_type) {
            return Err(SdkError::DuplicateRegistration(format!(
                "activity '{}' is already registered",
                activity_type
            )));
        }
        activities.insert(
            activity_type.to_string(),
            Arc::new(RegisteredActivity {
                activity_type: activity_type.to_string(),
                execute_fn,
            }),
        );
        Ok(())
    }

    pub fn unregister(&self, activity_type: &str) {
        self.activities.write().remove(activity_type);
    }

    pub fn get(&self, activity_type: &str) -> Option<Arc<RegisteredActivity>> {
        self.activities.read().get(activity_type).cloned()
    }

    pub fn has(&self, activity_type: &str) -> bool {
        self.activities.read().contains_key(activity_type)
    }
}
