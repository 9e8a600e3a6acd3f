//! WorkflowDefinition trait

use crate::error::Result;
use crate::options::WorkflowAttributes;
use crate::workflow::context::WorkflowContext;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// Definition of a workflow with typed input and output.
///
/// The type name, signal and query names, and option attributes are
/// declared statically, so a [`WorkflowTarget`](crate::options::WorkflowTarget)
/// can be built for a workflow without an instance of it.
///
/// ```ignore
/// struct Greeter;
///
/// #[async_trait]
/// impl WorkflowDefinition for Greeter {
///     const WORKFLOW_TYPE: &'static str = "Greeter";
///     type Input = String;
///     type Output = String;
///
///     async fn run(&self, _ctx: &dyn WorkflowContext, name: String) -> Result<String> {
///         Ok(format!("Hello {}!", name))
///     }
///
///     fn interface_attributes() -> WorkflowAttributes {
///         WorkflowAttributes::new().task_queue("greetings")
///     }
/// }
/// ```
#[async_trait]
pub trait WorkflowDefinition: Send + Sync + 'static {
    /// Workflow type name registered with the proxy
    const WORKFLOW_TYPE: &'static str;

    /// Signals the workflow accepts
    const SIGNALS: &'static [&'static str] = &[];

    /// Queries the workflow answers
    const QUERIES: &'static [&'static str] = &[];

    type Input: Serialize + DeserializeOwned + Send;
    type Output: Serialize + DeserializeOwned + Send;

    /// Entry point
    async fn run(&self, ctx: &dyn WorkflowContext, input: Self::Input) -> Result<Self::Output>;

    /// Option defaults for every use of this workflow type
    fn interface_attributes() -> WorkflowAttributes {
        WorkflowAttributes::default()
    }

    /// Option defaults for the entry point; these take precedence over
    /// [`WorkflowDefinition::interface_attributes`]
    fn run_attributes() -> WorkflowAttributes {
        WorkflowAttributes::default()
    }
}
