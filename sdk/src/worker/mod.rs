//! Worker pool, implementation registries and invocation dispatch

pub(crate) mod dispatch;
pub mod pool;
pub mod registry;

pub use pool::{DisposeOutcome, WorkerHandle, WorkerKey, WorkerPool};
pub use registry::{
    ActivityRegistry, BoxedActivityFn, BoxedWorkflowFn, RegisteredActivity, RegisteredWorkflow,
    WorkflowMetadata, WorkflowRegistration, WorkflowRegistry,
};
