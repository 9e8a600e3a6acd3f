//! Worker coordinates shared by the SDK and the proxy

use crate::error::{CoreError, CoreResult};
use crate::protocol::{PropertyField, PropertyValue};
use serde::{Deserialize, Serialize};

/// What a proxy-side worker polls for.
///
/// A workflow-only and an activity-only worker on the same namespace and
/// task queue are distinct workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i32)]
pub enum WorkerKind {
    WorkflowOnly = 1,
    ActivityOnly = 2,
    Both = 3,
}

impl WorkerKind {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::WorkflowOnly),
            2 => Some(Self::ActivityOnly),
            3 => Some(Self::Both),
            _ => None,
        }
    }

    pub fn polls_workflows(self) -> bool {
        matches!(self, Self::WorkflowOnly | Self::Both)
    }

    pub fn polls_activities(self) -> bool {
        matches!(self, Self::ActivityOnly | Self::Both)
    }
}

impl PropertyField for WorkerKind {
    fn to_property(self) -> CoreResult<PropertyValue> {
        Ok(PropertyValue::Int32(self as i32))
    }

    fn from_property(key: &str, value: PropertyValue) -> CoreResult<Self> {
        let raw = i32::from_property(key, value)?;
        Self::from_i32(raw).ok_or_else(|| {
            CoreError::MalformedMessage(format!("property '{}' has unknown worker kind {}", key, raw))
        })
    }
}
