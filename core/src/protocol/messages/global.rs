//! Connection, worker and namespace management messages

use super::{proxy_reply, proxy_request};
use crate::worker::WorkerKind;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Namespace summary returned by describe and list operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: NamespaceStatus,
    #[serde(default)]
    pub owner_email: Option<String>,
    #[serde(default)]
    pub retention_days: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceStatus {
    Registered,
    Deprecated,
    Deleted,
}

/// A poller currently attached to a task queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollerInfo {
    pub identity: String,
    /// Last time the poller was seen, in nanoseconds since the Unix epoch
    /// like every other timestamp in the protocol
    #[serde(with = "chrono::serde::ts_nanoseconds")]
    pub last_access_time: DateTime<Utc>,
    pub rate_per_second: f64,
}

crate::json_property_field!(NamespaceInfo, Vec<NamespaceInfo>, PollerInfo, Vec<PollerInfo>, Vec<String>);

proxy_request! {
    /// First message on a new transport
    InitializeRequest => InitializeReply {
        "LibraryName" => library_name: String,
        "LibraryVersion" => library_version: String,
        "LogLevel" => log_level: String,
    }
}

proxy_reply! {
    InitializeReply {}
}

proxy_request! {
    /// Opens a logical client session against the orchestration server
    ConnectRequest => ConnectReply {
        "HostPort" => host_port: String,
        "Identity" => identity: String,
        "ClientTimeout" => client_timeout: TimeDelta,
        "Namespace" => namespace: String,
        "CreateNamespace" => create_namespace: bool,
        "RetryAttempts" => retry_attempts: i32,
        "RetryDelay" => retry_delay: TimeDelta,
    }
}

proxy_reply! {
    ConnectReply {}
}

proxy_request! {
    /// Closes one logical client session
    DisconnectRequest => DisconnectReply {}
}

proxy_reply! {
    DisconnectReply {}
}

proxy_request! {
    /// Asks the proxy to shut down
    TerminateRequest => TerminateReply {}
}

proxy_reply! {
    TerminateReply {}
}

proxy_request! {
    /// Liveness check, sent in both directions
    HeartbeatRequest => HeartbeatReply {}
}

proxy_reply! {
    HeartbeatReply {}
}

proxy_request! {
    /// Cancels the in-flight request identified by `target_request_id`
    CancelRequest => CancelReply {
        "TargetRequestId" => target_request_id: u32,
    }
}

proxy_reply! {
    CancelReply {
        "WasCancelled" => was_cancelled: bool,
    }
}

proxy_request! {
    PingRequest => PingReply {}
}

proxy_reply! {
    PingReply {}
}

proxy_request! {
    /// Registers a worker for a namespace, task queue and kind
    NewWorkerRequest => NewWorkerReply {
        "Namespace" => namespace: String,
        "TaskQueue" => task_queue: String,
        "WorkerKind" => kind: WorkerKind,
        "Options" => options: serde_json::Value,
    }
}

proxy_reply! {
    NewWorkerReply {
        "WorkerId" => worker_id: i64,
    }
}

proxy_request! {
    StartWorkerRequest => StartWorkerReply {
        "WorkerId" => worker_id: i64,
    }
}

proxy_reply! {
    StartWorkerReply {}
}

proxy_request! {
    StopWorkerRequest => StopWorkerReply {
        "WorkerId" => worker_id: i64,
    }
}

proxy_reply! {
    StopWorkerReply {}
}

proxy_request! {
    /// Sets the size of the proxy's sticky workflow cache
    SetCacheSizeRequest => SetCacheSizeReply {
        "Size" => size: i32,
    }
}

proxy_reply! {
    SetCacheSizeReply {}
}

proxy_request! {
    /// Log line forwarded by the proxy
    LogRequest => LogReply {
        "Time" => time: DateTime<Utc>,
        "LogLevel" => log_level: String,
        /// False when the line came from the orchestration client library
        /// hosted by the proxy rather than the proxy itself
        "FromProxy" => from_proxy: bool,
        "LogMessage" => log_message: String,
    }
}

proxy_reply! {
    LogReply {}
}

proxy_request! {
    NamespaceRegisterRequest => NamespaceRegisterReply {
        "Name" => name: String,
        "Description" => description: String,
        "OwnerEmail" => owner_email: String,
        "RetentionDays" => retention_days: i32,
        "SecurityToken" => security_token: String,
    }
}

proxy_reply! {
    NamespaceRegisterReply {}
}

proxy_request! {
    NamespaceDescribeRequest => NamespaceDescribeReply {
        "Name" => name: String,
    }
}

proxy_reply! {
    NamespaceDescribeReply {
        "NamespaceInfo" => info: NamespaceInfo,
    }
}

proxy_request! {
    NamespaceUpdateRequest => NamespaceUpdateReply {
        "Name" => name: String,
        "Description" => description: String,
        "OwnerEmail" => owner_email: String,
        "RetentionDays" => retention_days: i32,
        "SecurityToken" => security_token: String,
    }
}

proxy_reply! {
    NamespaceUpdateReply {}
}

proxy_request! {
    NamespaceDeprecateRequest => NamespaceDeprecateReply {
        "Name" => name: String,
        "SecurityToken" => security_token: String,
    }
}

proxy_reply! {
    NamespaceDeprecateReply {}
}

proxy_request! {
    NamespaceListRequest => NamespaceListReply {
        "PageSize" => page_size: i32,
        "NextPageToken" => next_page_token: Vec<u8>,
    }
}

proxy_reply! {
    NamespaceListReply {
        "Namespaces" => namespaces: Vec<NamespaceInfo>,
        "NextPageToken" => next_page_token: Vec<u8>,
    }
}

proxy_request! {
    DescribeTaskQueueRequest => DescribeTaskQueueReply {
        "Name" => name: String,
        "Namespace" => namespace: String,
        "TaskQueueKind" => kind: WorkerKind,
    }
}

proxy_reply! {
    DescribeTaskQueueReply {
        "Pollers" => pollers: Vec<PollerInfo>,
    }
}
