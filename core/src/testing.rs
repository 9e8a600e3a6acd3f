//! Test utilities for SDKs built on this crate.
//!
//! Available only with the `testing` feature enabled.

use crate::error::CoreResult;
use crate::protocol::messages::*;
use crate::protocol::{MessageType, PropertyValue, ProxyError, ProxyErrorKind, ProxyMessage};
use crate::worker::WorkerKind;
use crate::workflow::{MarkerKind, ReplayMarker, WorkflowIdReusePolicy};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde_json::json;

/// A populated message plus a comparison that goes through its typed form
pub struct MessageSample {
    pub message: ProxyMessage,
    typed_eq: fn(&ProxyMessage, &ProxyMessage) -> CoreResult<bool>,
}

impl MessageSample {
    fn of<T: TypedMessage + PartialEq>(value: T) -> CoreResult<Self> {
        Ok(Self {
            message: value.into_message()?,
            typed_eq: typed_eq::<T>,
        })
    }

    pub fn message_type(&self) -> MessageType {
        self.message.message_type
    }

    /// True when `other` decodes to the same typed value as this sample
    pub fn same_typed_value(&self, other: &ProxyMessage) -> CoreResult<bool> {
        (self.typed_eq)(&self.message, other)
    }
}

fn typed_eq<T: TypedMessage + PartialEq>(a: &ProxyMessage, b: &ProxyMessage) -> CoreResult<bool> {
    Ok(T::try_from_message(a.clone())? == T::try_from_message(b.clone())?)
}

fn text(s: &str) -> Option<String> {
    Some(s.to_string())
}

fn bytes(s: &str) -> Option<Vec<u8>> {
    Some(s.as_bytes().to_vec())
}

fn at(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}

/// One sample of every message type, with every field set. Intervals and
/// timestamps sit at the ends of their ranges.
pub fn every_message() -> CoreResult<Vec<MessageSample>> {
    let namespace = NamespaceInfo {
        name: "billing".to_string(),
        description: text("invoices"),
        status: NamespaceStatus::Registered,
        owner_email: text("ops@example.com"),
        retention_days: Some(7),
    };
    let poller = PollerInfo {
        identity: "worker-1".to_string(),
        last_access_time: at(1_700_000_000_000_000_123),
        rate_per_second: 100_000.0,
    };
    let marker = ReplayMarker {
        sequence: 0,
        kind: MarkerKind::Version,
        label: text("new-pricing"),
        value: json!(2),
    };
    let description = WorkflowExecutionDescription {
        workflow_id: "wf-1".to_string(),
        run_id: "run-1".to_string(),
        workflow_type: "Workflow1".to_string(),
        task_queue: "q1".to_string(),
        status: WorkflowExecutionStatus::Completed,
        start_time: at(1_700_000_000_000_000_000),
        close_time: Some(at(1_700_000_001_000_000_000)),
        history_length: 11,
    };
    let failure = ProxyError::new(ProxyErrorKind::Timeout, "start-to-close");
    let (min, max) = (TimeDelta::nanoseconds(i64::MIN), TimeDelta::nanoseconds(i64::MAX));
    let mut unknown = std::collections::BTreeMap::new();
    unknown.insert("AddedLater".to_string(), PropertyValue::Int32(8));

    Ok(vec![
        MessageSample::of(InitializeRequest {
            client_id: 0,
            request_id: 1,
            library_name: text("durable-proxy-sdk"),
            library_version: text("0.1.0"),
            log_level: text("Info"),
            ..Default::default()
        })?,
        MessageSample::of(InitializeReply {
            request_id: 1,
            error: Some(ProxyError::generic("unsupported version")),
            ..Default::default()
        })?,
        MessageSample::of(ConnectRequest {
            client_id: 1,
            request_id: 2,
            host_port: text("localhost:7233"),
            identity: text("worker@host"),
            client_timeout: Some(min),
            namespace: text("default"),
            create_namespace: Some(true),
            retry_attempts: Some(3),
            retry_delay: Some(max),
            ..Default::default()
        })?,
        MessageSample::of(ConnectReply {
            client_id: 1,
            request_id: 2,
            ..Default::default()
        })?,
        MessageSample::of(DisconnectRequest {
            client_id: 1,
            request_id: 3,
            ..Default::default()
        })?,
        MessageSample::of(DisconnectReply::default())?,
        MessageSample::of(TerminateRequest::default())?,
        MessageSample::of(TerminateReply::default())?,
        MessageSample::of(HeartbeatRequest {
            request_id: u32::MAX,
            ..Default::default()
        })?,
        MessageSample::of(HeartbeatReply::default())?,
        MessageSample::of(CancelRequest {
            target_request_id: Some(41),
            ..Default::default()
        })?,
        MessageSample::of(CancelReply {
            was_cancelled: Some(false),
            ..Default::default()
        })?,
        MessageSample::of(PingRequest {
            extensions: unknown,
            ..Default::default()
        })?,
        MessageSample::of(PingReply::default())?,
        MessageSample::of(NewWorkerRequest {
            namespace: text("default"),
            task_queue: text("q1"),
            kind: Some(WorkerKind::ActivityOnly),
            options: Some(json!({"max_concurrent_activities": 4})),
            ..Default::default()
        })?,
        MessageSample::of(NewWorkerReply {
            worker_id: Some(100),
            ..Default::default()
        })?,
        MessageSample::of(StartWorkerRequest {
            worker_id: Some(100),
            ..Default::default()
        })?,
        MessageSample::of(StartWorkerReply::default())?,
        MessageSample::of(StopWorkerRequest {
            worker_id: Some(100),
            ..Default::default()
        })?,
        MessageSample::of(StopWorkerReply::default())?,
        MessageSample::of(SetCacheSizeRequest {
            size: Some(10_000),
            ..Default::default()
        })?,
        MessageSample::of(SetCacheSizeReply::default())?,
        MessageSample::of(LogRequest {
            time: Some(at(i64::MIN)),
            log_level: text("Warn"),
            from_proxy: Some(false),
            log_message: text("poller restarted"),
            ..Default::default()
        })?,
        MessageSample::of(LogReply::default())?,
        MessageSample::of(NamespaceRegisterRequest {
            name: text("billing"),
            description: text("invoices"),
            owner_email: text("ops@example.com"),
            retention_days: Some(7),
            security_token: text("secret"),
            ..Default::default()
        })?,
        MessageSample::of(NamespaceRegisterReply::default())?,
        MessageSample::of(NamespaceDescribeRequest {
            name: text("billing"),
            ..Default::default()
        })?,
        MessageSample::of(NamespaceDescribeReply {
            info: Some(namespace.clone()),
            ..Default::default()
        })?,
        MessageSample::of(NamespaceUpdateRequest {
            name: text("billing"),
            description: Some(String::new()),
            owner_email: text("billing@example.com"),
            retention_days: Some(30),
            security_token: None,
            ..Default::default()
        })?,
        MessageSample::of(NamespaceUpdateReply::default())?,
        MessageSample::of(NamespaceDeprecateRequest {
            name: text("billing"),
            security_token: text("secret"),
            ..Default::default()
        })?,
        MessageSample::of(NamespaceDeprecateReply::default())?,
        MessageSample::of(NamespaceListRequest {
            page_size: Some(2),
            next_page_token: Some(Vec::new()),
            ..Default::default()
        })?,
        MessageSample::of(NamespaceListReply {
            namespaces: Some(vec![namespace]),
            next_page_token: bytes("page-2"),
            ..Default::default()
        })?,
        MessageSample::of(DescribeTaskQueueRequest {
            name: text("q1"),
            namespace: text("default"),
            kind: Some(WorkerKind::WorkflowOnly),
            ..Default::default()
        })?,
        MessageSample::of(DescribeTaskQueueReply {
            pollers: Some(vec![poller]),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowRegisterRequest {
            name: text("Orders::create"),
            signals: Some(vec!["approve".to_string()]),
            queries: Some(Vec::new()),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowRegisterReply::default())?,
        MessageSample::of(WorkflowExecuteRequest {
            workflow: text("Workflow1"),
            workflow_id: text("wf-1"),
            namespace: text("default"),
            task_queue: text("q1"),
            args: Some(Vec::new()),
            execution_timeout: Some(max),
            run_timeout: Some(TimeDelta::zero()),
            task_timeout: Some(TimeDelta::seconds(10)),
            id_reuse_policy: Some(WorkflowIdReusePolicy::RejectDuplicate),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowExecuteReply {
            workflow_id: text("wf-1"),
            run_id: text("run-1"),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowGetResultRequest {
            workflow_id: text("wf-1"),
            run_id: text("run-1"),
            namespace: text("default"),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowGetResultReply {
            result: bytes(r#""WF1 says: Hello Jeff!""#),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowSignalRequest {
            workflow_id: text("wf-1"),
            run_id: text("run-1"),
            namespace: text("default"),
            signal_name: text("approve"),
            signal_args: bytes("true"),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowSignalReply::default())?,
        MessageSample::of(WorkflowSignalWithStartRequest {
            workflow: text("SignalWorkflow"),
            workflow_id: text("wf-2"),
            namespace: text("default"),
            task_queue: text("q1"),
            args: bytes("null"),
            execution_timeout: Some(TimeDelta::hours(24)),
            run_timeout: Some(TimeDelta::hours(24)),
            task_timeout: Some(TimeDelta::seconds(10)),
            id_reuse_policy: Some(WorkflowIdReusePolicy::AllowDuplicate),
            signal_name: text("name"),
            signal_args: bytes(r#""Jeff""#),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowSignalWithStartReply {
            workflow_id: text("wf-2"),
            run_id: text("run-2"),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowQueryRequest {
            workflow_id: text("wf-1"),
            run_id: None,
            namespace: text("default"),
            query_name: text("status"),
            query_args: bytes("null"),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowQueryReply {
            result: bytes(r#""waiting""#),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowDescribeExecutionRequest {
            workflow_id: text("wf-1"),
            run_id: text("run-1"),
            namespace: text("default"),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowDescribeExecutionReply {
            details: Some(description),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowCancelRequest {
            workflow_id: text("wf-1"),
            namespace: text("default"),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowCancelReply::default())?,
        MessageSample::of(WorkflowTerminateRequest {
            workflow_id: text("wf-1"),
            run_id: text("run-1"),
            namespace: text("default"),
            reason: text("stuck"),
            details: bytes(r#"{"ticket":42}"#),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowTerminateReply::default())?,
        MessageSample::of(WorkflowInvokeRequest {
            context_id: Some(12),
            workflow: text("Workflow2"),
            workflow_id: text("wf-2"),
            run_id: text("run-1"),
            namespace: text("default"),
            task_queue: text("q2"),
            args: bytes(r#""Jeff""#),
            history: Some(vec![marker.clone()]),
            replay_requested: Some(true),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowInvokeReply {
            result: bytes(r#""WF2 says: Hello Jeff!""#),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowSignalInvokeRequest {
            context_id: Some(12),
            signal_name: text("name"),
            signal_args: bytes(r#""Jeff""#),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowSignalInvokeReply::default())?,
        MessageSample::of(WorkflowQueryInvokeRequest {
            context_id: Some(12),
            query_name: text("status"),
            query_args: Some(Vec::new()),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowQueryInvokeReply {
            result: bytes("null"),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowExecuteChildRequest {
            context_id: Some(12),
            workflow: text("Workflow1"),
            workflow_id: None,
            namespace: text("default"),
            task_queue: text("q1"),
            args: bytes(r#""Jeff""#),
            execution_timeout: Some(min),
            run_timeout: Some(TimeDelta::nanoseconds(-1)),
            task_timeout: Some(TimeDelta::seconds(10)),
            id_reuse_policy: Some(WorkflowIdReusePolicy::AllowDuplicateFailedOnly),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowExecuteChildReply {
            result: bytes(r#""child done""#),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowMutableRequest {
            context_id: Some(12),
            marker: Some(marker),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowMutableReply::default())?,
        MessageSample::of(WorkflowGetTimeRequest {
            context_id: Some(12),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowGetTimeReply {
            time: Some(at(i64::MAX)),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowSleepRequest {
            context_id: Some(12),
            duration: Some(TimeDelta::milliseconds(1500)),
            ..Default::default()
        })?,
        MessageSample::of(WorkflowSleepReply {
            error: Some(ProxyError::cancelled("timer cancelled")),
            ..Default::default()
        })?,
        MessageSample::of(ActivityRegisterRequest {
            name: text("Greet"),
            ..Default::default()
        })?,
        MessageSample::of(ActivityRegisterReply::default())?,
        MessageSample::of(ActivityExecuteRequest {
            context_id: Some(12),
            activity: text("Greet"),
            namespace: text("default"),
            task_queue: text("q1"),
            args: bytes(r#""Jeff""#),
            schedule_to_close_timeout: Some(TimeDelta::hours(24)),
            schedule_to_start_timeout: Some(TimeDelta::hours(24)),
            start_to_close_timeout: Some(TimeDelta::minutes(5)),
            heartbeat_timeout: Some(TimeDelta::zero()),
            ..Default::default()
        })?,
        MessageSample::of(ActivityExecuteReply {
            result: bytes(r#""Hello Jeff!""#),
            ..Default::default()
        })?,
        MessageSample::of(ActivityInvokeRequest {
            context_id: Some(13),
            activity: text("Greet"),
            activity_id: text("activity-13"),
            namespace: text("default"),
            task_queue: text("q1"),
            args: bytes(r#""Jeff""#),
            task_token: Some(vec![0, 1, 2, 255]),
            ..Default::default()
        })?,
        MessageSample::of(ActivityInvokeReply {
            result: None,
            pending: Some(true),
            ..Default::default()
        })?,
        MessageSample::of(ActivityGetHeartbeatDetailsRequest {
            context_id: Some(13),
            ..Default::default()
        })?,
        MessageSample::of(ActivityGetHeartbeatDetailsReply {
            details: bytes(r#"{"processed":3}"#),
            ..Default::default()
        })?,
        MessageSample::of(ActivityRecordHeartbeatRequest {
            context_id: Some(13),
            details: bytes(r#"{"processed":3}"#),
            ..Default::default()
        })?,
        MessageSample::of(ActivityRecordHeartbeatReply::default())?,
        MessageSample::of(ActivityHasHeartbeatDetailsRequest {
            context_id: Some(13),
            ..Default::default()
        })?,
        MessageSample::of(ActivityHasHeartbeatDetailsReply {
            has_details: Some(true),
            ..Default::default()
        })?,
        MessageSample::of(ActivityStoppingRequest {
            context_id: Some(13),
            ..Default::default()
        })?,
        MessageSample::of(ActivityStoppingReply::default())?,
        MessageSample::of(ActivityExecuteLocalRequest {
            context_id: Some(12),
            activity: text("Echo"),
            args: bytes("[1,2,3]"),
            schedule_to_close_timeout: Some(TimeDelta::seconds(30)),
            start_to_close_timeout: Some(TimeDelta::seconds(10)),
            ..Default::default()
        })?,
        MessageSample::of(ActivityExecuteLocalReply {
            result: bytes("[1,2,3]"),
            ..Default::default()
        })?,
        MessageSample::of(ActivityInvokeLocalRequest {
            context_id: Some(14),
            activity: text("Echo"),
            activity_id: text("local-14"),
            args: bytes("[1,2,3]"),
            ..Default::default()
        })?,
        MessageSample::of(ActivityInvokeLocalReply {
            result: bytes("[1,2,3]"),
            ..Default::default()
        })?,
        MessageSample::of(ActivityCompleteRequest {
            task_token: Some(vec![0, 1, 2, 255]),
            namespace: text("default"),
            workflow_id: text("wf-1"),
            run_id: text("run-1"),
            activity_id: text("activity-13"),
            result: None,
            error: Some(failure),
            ..Default::default()
        })?,
        MessageSample::of(ActivityCompleteReply {
            attachments: vec![None, Some(Vec::new()), Some(vec![7])],
            ..Default::default()
        })?,
    ])
}
