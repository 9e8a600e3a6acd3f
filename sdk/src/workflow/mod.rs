//! Workflow definitions and execution context

pub mod context;
pub mod context_impl;
pub mod definition;

pub use context::{QueryHandlerFn, SideEffectFn, WorkflowContext, WorkflowContextExt};
pub use context_impl::{WorkflowContextImpl, WorkflowInfo};
pub use definition::WorkflowDefinition;
