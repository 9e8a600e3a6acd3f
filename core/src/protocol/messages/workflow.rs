//! Workflow messages.
//!
//! `*Invoke*` requests flow from the proxy to the SDK and are answered by
//! the SDK; everything else is sent by the SDK. Invocations are routed by
//! `ClientId` and, within a client, by `ContextId`.

use super::{proxy_reply, proxy_request};
use crate::workflow::{ReplayMarker, WorkflowIdReusePolicy};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a workflow execution as reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowExecutionStatus {
    Running,
    Completed,
    Failed,
    Canceled,
    Terminated,
    ContinuedAsNew,
    TimedOut,
}

/// Server-side view of one workflow execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowExecutionDescription {
    pub workflow_id: String,
    pub run_id: String,
    pub workflow_type: String,
    pub task_queue: String,
    pub status: WorkflowExecutionStatus,
    #[serde(with = "chrono::serde::ts_nanoseconds")]
    pub start_time: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_nanoseconds_option")]
    pub close_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history_length: i64,
}

crate::json_property_field!(WorkflowExecutionDescription);

proxy_request! {
    /// Announces a workflow implementation hosted by a client
    WorkflowRegisterRequest => WorkflowRegisterReply {
        "Name" => name: String,
        "Signals" => signals: Vec<String>,
        "Queries" => queries: Vec<String>,
    }
}

proxy_reply! {
    WorkflowRegisterReply {}
}

proxy_request! {
    /// Starts a top-level workflow execution with fully resolved options
    WorkflowExecuteRequest => WorkflowExecuteReply {
        "Workflow" => workflow: String,
        "WorkflowId" => workflow_id: String,
        "Namespace" => namespace: String,
        "TaskQueue" => task_queue: String,
        "Args" => args: Vec<u8>,
        "ExecutionTimeout" => execution_timeout: TimeDelta,
        "RunTimeout" => run_timeout: TimeDelta,
        "TaskTimeout" => task_timeout: TimeDelta,
        "IdReusePolicy" => id_reuse_policy: WorkflowIdReusePolicy,
    }
}

proxy_reply! {
    WorkflowExecuteReply {
        "WorkflowId" => workflow_id: String,
        "RunId" => run_id: String,
    }
}

proxy_request! {
    /// Waits for a workflow execution to finish and returns its result
    WorkflowGetResultRequest => WorkflowGetResultReply {
        "WorkflowId" => workflow_id: String,
        "RunId" => run_id: String,
        "Namespace" => namespace: String,
    }
}

proxy_reply! {
    WorkflowGetResultReply {
        "Result" => result: Vec<u8>,
    }
}

proxy_request! {
    WorkflowSignalRequest => WorkflowSignalReply {
        "WorkflowId" => workflow_id: String,
        "RunId" => run_id: String,
        "Namespace" => namespace: String,
        "SignalName" => signal_name: String,
        "SignalArgs" => signal_args: Vec<u8>,
    }
}

proxy_reply! {
    WorkflowSignalReply {}
}

proxy_request! {
    /// Signals an execution, starting it first if it is not running
    WorkflowSignalWithStartRequest => WorkflowSignalWithStartReply {
        "Workflow" => workflow: String,
        "WorkflowId" => workflow_id: String,
        "Namespace" => namespace: String,
        "TaskQueue" => task_queue: String,
        "Args" => args: Vec<u8>,
        "ExecutionTimeout" => execution_timeout: TimeDelta,
        "RunTimeout" => run_timeout: TimeDelta,
        "TaskTimeout" => task_timeout: TimeDelta,
        "IdReusePolicy" => id_reuse_policy: WorkflowIdReusePolicy,
        "SignalName" => signal_name: String,
        "SignalArgs" => signal_args: Vec<u8>,
    }
}

proxy_reply! {
    WorkflowSignalWithStartReply {
        "WorkflowId" => workflow_id: String,
        "RunId" => run_id: String,
    }
}

proxy_request! {
    WorkflowQueryRequest => WorkflowQueryReply {
        "WorkflowId" => workflow_id: String,
        "RunId" => run_id: String,
        "Namespace" => namespace: String,
        "QueryName" => query_name: String,
        "QueryArgs" => query_args: Vec<u8>,
    }
}

proxy_reply! {
    WorkflowQueryReply {
        "Result" => result: Vec<u8>,
    }
}

proxy_request! {
    WorkflowDescribeExecutionRequest => WorkflowDescribeExecutionReply {
        "WorkflowId" => workflow_id: String,
        "RunId" => run_id: String,
        "Namespace" => namespace: String,
    }
}

proxy_reply! {
    WorkflowDescribeExecutionReply {
        "Details" => details: WorkflowExecutionDescription,
    }
}

proxy_request! {
    WorkflowCancelRequest => WorkflowCancelReply {
        "WorkflowId" => workflow_id: String,
        "RunId" => run_id: String,
        "Namespace" => namespace: String,
    }
}

proxy_reply! {
    WorkflowCancelReply {}
}

proxy_request! {
    WorkflowTerminateRequest => WorkflowTerminateReply {
        "WorkflowId" => workflow_id: String,
        "RunId" => run_id: String,
        "Namespace" => namespace: String,
        "Reason" => reason: String,
        "Details" => details: Vec<u8>,
    }
}

proxy_reply! {
    WorkflowTerminateReply {}
}

proxy_request! {
    /// Delivers a workflow task: run (or replay) the named workflow
    WorkflowInvokeRequest => WorkflowInvokeReply {
        "ContextId" => context_id: i64,
        "Workflow" => workflow: String,
        "WorkflowId" => workflow_id: String,
        "RunId" => run_id: String,
        "Namespace" => namespace: String,
        "TaskQueue" => task_queue: String,
        "Args" => args: Vec<u8>,
        /// Markers recorded by earlier runs of this execution, in order
        "History" => history: Vec<ReplayMarker>,
        "ReplayRequested" => replay_requested: bool,
    }
}

proxy_reply! {
    WorkflowInvokeReply {
        "Result" => result: Vec<u8>,
    }
}

proxy_request! {
    /// Delivers a signal to a running execution
    WorkflowSignalInvokeRequest => WorkflowSignalInvokeReply {
        "ContextId" => context_id: i64,
        "SignalName" => signal_name: String,
        "SignalArgs" => signal_args: Vec<u8>,
    }
}

proxy_reply! {
    WorkflowSignalInvokeReply {}
}

proxy_request! {
    /// Asks a running execution to answer a query
    WorkflowQueryInvokeRequest => WorkflowQueryInvokeReply {
        "ContextId" => context_id: i64,
        "QueryName" => query_name: String,
        "QueryArgs" => query_args: Vec<u8>,
    }
}

proxy_reply! {
    WorkflowQueryInvokeReply {
        "Result" => result: Vec<u8>,
    }
}

proxy_request! {
    /// Runs a child workflow on behalf of the execution `context_id`
    WorkflowExecuteChildRequest => WorkflowExecuteChildReply {
        "ContextId" => context_id: i64,
        "Workflow" => workflow: String,
        "WorkflowId" => workflow_id: String,
        "Namespace" => namespace: String,
        "TaskQueue" => task_queue: String,
        "Args" => args: Vec<u8>,
        "ExecutionTimeout" => execution_timeout: TimeDelta,
        "RunTimeout" => run_timeout: TimeDelta,
        "TaskTimeout" => task_timeout: TimeDelta,
        "IdReusePolicy" => id_reuse_policy: WorkflowIdReusePolicy,
    }
}

proxy_reply! {
    WorkflowExecuteChildReply {
        "Result" => result: Vec<u8>,
    }
}

proxy_request! {
    /// Persists a newly recorded replay marker
    WorkflowMutableRequest => WorkflowMutableReply {
        "ContextId" => context_id: i64,
        "Marker" => marker: ReplayMarker,
    }
}

proxy_reply! {
    WorkflowMutableReply {}
}

proxy_request! {
    /// Asks for the workflow clock of the execution `context_id`
    WorkflowGetTimeRequest => WorkflowGetTimeReply {
        "ContextId" => context_id: i64,
    }
}

proxy_reply! {
    WorkflowGetTimeReply {
        "Time" => time: DateTime<Utc>,
    }
}

proxy_request! {
    /// Starts a durable timer; answered when it fires
    WorkflowSleepRequest => WorkflowSleepReply {
        "ContextId" => context_id: i64,
        "Duration" => duration: TimeDelta,
    }
}

proxy_reply! {
    WorkflowSleepReply {}
}
