//! ActivityDefinition trait

use crate::activity::context::ActivityContext;
use crate::error::Result;
use crate::options::ActivityAttributes;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// Definition of an activity with typed input and output.
///
/// Activities are not replayed, so they may do I/O freely. Long-running
/// ones should call [`ActivityContext::heartbeat_raw`] and watch for
/// cancellation.
#[async_trait]
pub trait ActivityDefinition: Send + Sync + 'static {
    /// Activity type name registered with the proxy
    const ACTIVITY_TYPE: &'static str;

    type Input: Serialize + DeserializeOwned + Send;
    type Output: Serialize + DeserializeOwned + Send;

    async fn run(&self, ctx: &dyn ActivityContext, input: Self::Input) -> Result<Self::Output>;

    /// Option defaults for every use of this activity type
    fn interface_attributes() -> ActivityAttributes {
        ActivityAttributes::default()
    }

    /// Option defaults for the entry point
    fn run_attributes() -> ActivityAttributes {
        ActivityAttributes::default()
    }
}
