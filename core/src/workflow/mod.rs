//! Workflow-side types: id reuse policy and the replay log

pub mod replay;

pub use replay::{MarkerKind, ReplayMarker, ReplayState};

use crate::error::{CoreError, CoreResult};
use crate::protocol::{PropertyField, PropertyValue};
use serde::{Deserialize, Serialize};

/// What the server does when a workflow id is reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum WorkflowIdReusePolicy {
    /// Start a new run whatever the previous run's outcome was
    #[default]
    AllowDuplicate = 1,
    /// Start a new run only if the previous one did not complete successfully
    AllowDuplicateFailedOnly = 2,
    /// Never reuse the id
    RejectDuplicate = 3,
    /// Terminate a running execution with the same id, then start
    TerminateIfRunning = 4,
}

impl WorkflowIdReusePolicy {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::AllowDuplicate),
            2 => Some(Self::AllowDuplicateFailedOnly),
            3 => Some(Self::RejectDuplicate),
            4 => Some(Self::TerminateIfRunning),
            _ => None,
        }
    }
}

impl PropertyField for WorkflowIdReusePolicy {
    fn to_property(self) -> CoreResult<PropertyValue> {
        Ok(PropertyValue::Int32(self as i32))
    }

    fn from_property(key: &str, value: PropertyValue) -> CoreResult<Self> {
        let raw = i32::from_property(key, value)?;
        Self::from_i32(raw).ok_or_else(|| {
            CoreError::MalformedMessage(format!("property '{}' has unknown reuse policy {}", key, raw))
        })
    }
}
