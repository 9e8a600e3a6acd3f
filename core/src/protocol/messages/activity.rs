//! Activity messages

use super::{proxy_reply, proxy_request};
use crate::protocol::ProxyError;
use chrono::TimeDelta;

proxy_request! {
    ActivityRegisterRequest => ActivityRegisterReply {
        "Name" => name: String,
    }
}

proxy_reply! {
    ActivityRegisterReply {}
}

proxy_request! {
    /// Schedules an activity from the workflow execution `context_id`
    ActivityExecuteRequest => ActivityExecuteReply {
        "ContextId" => context_id: i64,
        "Activity" => activity: String,
        "Namespace" => namespace: String,
        "TaskQueue" => task_queue: String,
        "Args" => args: Vec<u8>,
        "ScheduleToCloseTimeout" => schedule_to_close_timeout: TimeDelta,
        "ScheduleToStartTimeout" => schedule_to_start_timeout: TimeDelta,
        "StartToCloseTimeout" => start_to_close_timeout: TimeDelta,
        "HeartbeatTimeout" => heartbeat_timeout: TimeDelta,
    }
}

proxy_reply! {
    ActivityExecuteReply {
        "Result" => result: Vec<u8>,
    }
}

proxy_request! {
    /// Runs an activity hosted by this SDK
    ActivityInvokeRequest => ActivityInvokeReply {
        "ContextId" => context_id: i64,
        "Activity" => activity: String,
        "ActivityId" => activity_id: String,
        "Namespace" => namespace: String,
        "TaskQueue" => task_queue: String,
        "Args" => args: Vec<u8>,
        /// Opaque server handle for completing the activity from elsewhere
        "TaskToken" => task_token: Vec<u8>,
    }
}

proxy_reply! {
    ActivityInvokeReply {
        "Result" => result: Vec<u8>,
        /// The activity will be completed later with an `ActivityCompleteRequest`
        "Pending" => pending: bool,
    }
}

proxy_request! {
    /// Details recorded by the last heartbeat of this activity, including
    /// heartbeats from earlier attempts
    ActivityGetHeartbeatDetailsRequest => ActivityGetHeartbeatDetailsReply {
        "ContextId" => context_id: i64,
    }
}

proxy_reply! {
    ActivityGetHeartbeatDetailsReply {
        "Details" => details: Vec<u8>,
    }
}

proxy_request! {
    ActivityHasHeartbeatDetailsRequest => ActivityHasHeartbeatDetailsReply {
        "ContextId" => context_id: i64,
    }
}

proxy_reply! {
    ActivityHasHeartbeatDetailsReply {
        "HasDetails" => has_details: bool,
    }
}

proxy_request! {
    ActivityRecordHeartbeatRequest => ActivityRecordHeartbeatReply {
        "ContextId" => context_id: i64,
        "Details" => details: Vec<u8>,
    }
}

proxy_reply! {
    ActivityRecordHeartbeatReply {}
}

proxy_request! {
    /// Tells a running activity that its worker is stopping
    ActivityStoppingRequest => ActivityStoppingReply {
        "ContextId" => context_id: i64,
    }
}

proxy_reply! {
    ActivityStoppingReply {}
}

proxy_request! {
    /// Runs an activity in the worker hosting the workflow `context_id`,
    /// without a round trip through a task queue
    ActivityExecuteLocalRequest => ActivityExecuteLocalReply {
        "ContextId" => context_id: i64,
        "Activity" => activity: String,
        "Args" => args: Vec<u8>,
        "ScheduleToCloseTimeout" => schedule_to_close_timeout: TimeDelta,
        "StartToCloseTimeout" => start_to_close_timeout: TimeDelta,
    }
}

proxy_reply! {
    ActivityExecuteLocalReply {
        "Result" => result: Vec<u8>,
    }
}

proxy_request! {
    /// Runs a local activity on behalf of the execution `context_id`
    ActivityInvokeLocalRequest => ActivityInvokeLocalReply {
        "ContextId" => context_id: i64,
        "Activity" => activity: String,
        "ActivityId" => activity_id: String,
        "Args" => args: Vec<u8>,
    }
}

proxy_reply! {
    ActivityInvokeLocalReply {
        "Result" => result: Vec<u8>,
    }
}

proxy_request! {
    /// Completes an activity that replied `Pending`, identified either by
    /// its task token or by workflow and activity ids
    ActivityCompleteRequest => ActivityCompleteReply {
        "TaskToken" => task_token: Vec<u8>,
        "Namespace" => namespace: String,
        "WorkflowId" => workflow_id: String,
        "RunId" => run_id: String,
        "ActivityId" => activity_id: String,
        "Result" => result: Vec<u8>,
        /// Set instead of `result` when the activity failed
        "Error" => error: ProxyError,
    }
}

proxy_reply! {
    ActivityCompleteReply {}
}
