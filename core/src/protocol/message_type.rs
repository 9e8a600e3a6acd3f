//! Message type tags and the static request/reply pairing

use std::fmt;

/// Type tag carried in the header of every proxy frame.
///
/// Tags are grouped by range: `1..=99` connection and namespace management,
/// `100..=199` workflows, `200..=299` activities. Every request is paired
/// with exactly one reply whose tag is the request tag plus one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i32)]
pub enum MessageType {
    InitializeRequest = 1,
    InitializeReply = 2,
    ConnectRequest = 3,
    ConnectReply = 4,
    TerminateRequest = 5,
    TerminateReply = 6,
    NamespaceRegisterRequest = 7,
    NamespaceRegisterReply = 8,
    NamespaceDescribeRequest = 9,
    NamespaceDescribeReply = 10,
    NamespaceUpdateRequest = 11,
    NamespaceUpdateReply = 12,
    HeartbeatRequest = 13,
    HeartbeatReply = 14,
    CancelRequest = 15,
    CancelReply = 16,
    NewWorkerRequest = 17,
    NewWorkerReply = 18,
    StopWorkerRequest = 19,
    StopWorkerReply = 20,
    PingRequest = 21,
    PingReply = 22,
    NamespaceDeprecateRequest = 23,
    NamespaceDeprecateReply = 24,
    LogRequest = 25,
    LogReply = 26,
    NamespaceListRequest = 27,
    NamespaceListReply = 28,
    DisconnectRequest = 29,
    DisconnectReply = 30,
    StartWorkerRequest = 31,
    StartWorkerReply = 32,
    DescribeTaskQueueRequest = 33,
    DescribeTaskQueueReply = 34,
    SetCacheSizeRequest = 35,
    SetCacheSizeReply = 36,

    WorkflowRegisterRequest = 100,
    WorkflowRegisterReply = 101,
    WorkflowExecuteRequest = 102,
    WorkflowExecuteReply = 103,
    WorkflowSignalRequest = 104,
    WorkflowSignalReply = 105,
    WorkflowSignalWithStartRequest = 106,
    WorkflowSignalWithStartReply = 107,
    WorkflowCancelRequest = 108,
    WorkflowCancelReply = 109,
    WorkflowTerminateRequest = 110,
    WorkflowTerminateReply = 111,
    WorkflowQueryRequest = 118,
    WorkflowQueryReply = 119,
    WorkflowDescribeExecutionRequest = 120,
    WorkflowDescribeExecutionReply = 121,
    WorkflowInvokeRequest = 124,
    WorkflowInvokeReply = 125,
    WorkflowExecuteChildRequest = 126,
    WorkflowExecuteChildReply = 127,
    WorkflowSignalInvokeRequest = 130,
    WorkflowSignalInvokeReply = 131,
    WorkflowMutableRequest = 132,
    WorkflowMutableReply = 133,
    WorkflowGetResultRequest = 138,
    WorkflowGetResultReply = 139,
    WorkflowGetTimeRequest = 146,
    WorkflowGetTimeReply = 147,
    WorkflowSleepRequest = 148,
    WorkflowSleepReply = 149,
    WorkflowQueryInvokeRequest = 160,
    WorkflowQueryInvokeReply = 161,

    ActivityExecuteRequest = 200,
    ActivityExecuteReply = 201,
    ActivityInvokeRequest = 202,
    ActivityInvokeReply = 203,
    ActivityGetHeartbeatDetailsRequest = 204,
    ActivityGetHeartbeatDetailsReply = 205,
    ActivityRecordHeartbeatRequest = 208,
    ActivityRecordHeartbeatReply = 209,
    ActivityHasHeartbeatDetailsRequest = 210,
    ActivityHasHeartbeatDetailsReply = 211,
    ActivityStoppingRequest = 212,
    ActivityStoppingReply = 213,
    ActivityExecuteLocalRequest = 214,
    ActivityExecuteLocalReply = 215,
    ActivityInvokeLocalRequest = 216,
    ActivityInvokeLocalReply = 217,
    ActivityRegisterRequest = 218,
    ActivityRegisterReply = 219,
    ActivityCompleteRequest = 222,
    ActivityCompleteReply = 223,
}

/// Request/reply pairs, the single source for [`MessageType::reply_type`]
/// and [`MessageType::request_type`].
const PAIRS: &[(MessageType, MessageType)] = {
    use MessageType::*;
    &[
        (InitializeRequest, InitializeReply),
        (ConnectRequest, ConnectReply),
        (TerminateRequest, TerminateReply),
        (NamespaceRegisterRequest, NamespaceRegisterReply),
        (NamespaceDescribeRequest, NamespaceDescribeReply),
        (NamespaceUpdateRequest, NamespaceUpdateReply),
        (HeartbeatRequest, HeartbeatReply),
        (CancelRequest, CancelReply),
        (NewWorkerRequest, NewWorkerReply),
        (StopWorkerRequest, StopWorkerReply),
        (PingRequest, PingReply),
        (NamespaceDeprecateRequest, NamespaceDeprecateReply),
        (LogRequest, LogReply),
        (NamespaceListRequest, NamespaceListReply),
        (DisconnectRequest, DisconnectReply),
        (StartWorkerRequest, StartWorkerReply),
        (DescribeTaskQueueRequest, DescribeTaskQueueReply),
        (SetCacheSizeRequest, SetCacheSizeReply),
        (WorkflowRegisterRequest, WorkflowRegisterReply),
        (WorkflowExecuteRequest, WorkflowExecuteReply),
        (WorkflowSignalRequest, WorkflowSignalReply),
        (WorkflowSignalWithStartRequest, WorkflowSignalWithStartReply),
        (WorkflowCancelRequest, WorkflowCancelReply),
        (WorkflowTerminateRequest, WorkflowTerminateReply),
        (WorkflowQueryRequest, WorkflowQueryReply),
        (WorkflowDescribeExecutionRequest, WorkflowDescribeExecutionReply),
        (WorkflowInvokeRequest, WorkflowInvokeReply),
        (WorkflowExecuteChildRequest, WorkflowExecuteChildReply),
        (WorkflowSignalInvokeRequest, WorkflowSignalInvokeReply),
        (WorkflowMutableRequest, WorkflowMutableReply),
        (WorkflowGetResultRequest, WorkflowGetResultReply),
        (WorkflowGetTimeRequest, WorkflowGetTimeReply),
        (WorkflowSleepRequest, WorkflowSleepReply),
        (WorkflowQueryInvokeRequest, WorkflowQueryInvokeReply),
        (ActivityExecuteRequest, ActivityExecuteReply),
        (ActivityInvokeRequest, ActivityInvokeReply),
        (ActivityGetHeartbeatDetailsRequest, ActivityGetHeartbeatDetailsReply),
        (ActivityRecordHeartbeatRequest, ActivityRecordHeartbeatReply),
        (ActivityHasHeartbeatDetailsRequest, ActivityHasHeartbeatDetailsReply),
        (ActivityStoppingRequest, ActivityStoppingReply),
        (ActivityExecuteLocalRequest, ActivityExecuteLocalReply),
        (ActivityInvokeLocalRequest, ActivityInvokeLocalReply),
        (ActivityRegisterRequest, ActivityRegisterReply),
        (ActivityCompleteRequest, ActivityCompleteReply),
    ]
};

impl MessageType {
    /// Every known message type, requests and replies interleaved
    pub fn all() -> impl Iterator<Item = MessageType> {
        PAIRS
            .iter()
            .flat_map(|(request, reply)| [*request, *reply])
    }

    /// Look up a tag read from the wire
    pub fn from_i32(tag: i32) -> Option<Self> {
        Self::all().find(|t| *t as i32 == tag)
    }

    /// Raw tag value
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// True for reply messages, which carry `Error` instead of a reply type
    pub fn is_reply(self) -> bool {
        PAIRS.iter().any(|(_, reply)| *reply == self)
    }

    /// True for request messages
    pub fn is_request(self) -> bool {
        !self.is_reply()
    }

    /// The reply expected for this request, or `None` if `self` is a reply
    pub fn reply_type(self) -> Option<Self> {
        PAIRS
            .iter()
            .find(|(request, _)| *request == self)
            .map(|(_, reply)| *reply)
    }

    /// The request this reply answers, or `None` if `self` is a request
    pub fn request_type(self) -> Option<Self> {
        PAIRS
            .iter()
            .find(|(_, reply)| *reply == self)
            .map(|(request, _)| *request)
    }
}

impl TryFrom<i32> for MessageType {
    type Error = i32;

    fn try_from(tag: i32) -> Result<Self, Self::Error> {
        Self::from_i32(tag).ok_or(tag)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, *self as i32)
    }
}
