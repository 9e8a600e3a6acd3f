//! Workflow E2E tests
//!
//! Workflows hosted by a client, running activities and children through
//! the proxy, receiving signals and answering queries.

use crate::fixtures::{
    Echo, FailingWorkflow, Greet, GreetingWorkflow, LocalEchoWorkflow, ParentWorkflow,
    PinnedWorkflow, SignalWorkflow, TimerWorkflow, Workflow1,
};
use crate::{settings, start_proxy, with_timeout};
use durable_proxy_core::protocol::messages::{
    ActivityExecuteRequest, ActivityRecordHeartbeatRequest, CancelRequest,
    WorkflowExecuteChildRequest, WorkflowExecuteRequest,
};
use durable_proxy_core::{MarkerKind, MessageType, ProxyErrorKind, TypedMessage, WorkerKind};
use durable_proxy_sdk::client::ClientHook;
use durable_proxy_sdk::error::{ErrorKind, SdkError};
use durable_proxy_sdk::options::{
    EffectiveActivityOptions, EffectiveChildOptions, EffectiveStartOptions, StartWorkflowOptions,
};
use durable_proxy_sdk::{ProxyClientBuilder, WorkflowExecutionStatus};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_workflow_runs_activity() {
    with_timeout("test_workflow_runs_activity", async {
        let (registry, proxy) = start_proxy();
        let client = ProxyClientBuilder::with_settings(settings("q1"))
            .register_workflow(GreetingWorkflow)
            .register_activity(Greet)
            .build(&registry)
            .await
            .unwrap();
        let worker = client.new_worker(None, None, WorkerKind::Both).await.unwrap();
        client.start_worker(&worker).await.unwrap();

        let greeting = client
            .execute_workflow::<GreetingWorkflow>("Jeff".to_string(), StartWorkflowOptions::new())
            .await
            .unwrap();
        assert_eq!(greeting, "Hello Jeff!");

        let execute = ActivityExecuteRequest::try_from_message(
            proxy.received(MessageType::ActivityExecuteRequest).remove(0),
        )
        .unwrap();
        assert_eq!(execute.activity.as_deref(), Some("Greet"));
        assert_eq!(execute.task_queue.as_deref(), Some("q1"));
        assert_eq!(execute.namespace.as_deref(), Some("default"));

        let heartbeat = ActivityRecordHeartbeatRequest::try_from_message(
            proxy
                .received(MessageType::ActivityRecordHeartbeatRequest)
                .remove(0),
        )
        .unwrap();
        assert_eq!(heartbeat.details.as_deref(), Some(&br#""greeting""#[..]));
    })
    .await;
}

#[tokio::test]
async fn test_workflow_runs_child_workflow() {
    with_timeout("test_workflow_runs_child_workflow", async {
        let (registry, proxy) = start_proxy();
        let client = ProxyClientBuilder::with_settings(settings("q1"))
            .register_workflow(ParentWorkflow)
            .register_workflow(Workflow1)
            .build(&registry)
            .await
            .unwrap();
        let worker = client
            .new_worker(None, None, WorkerKind::WorkflowOnly)
            .await
            .unwrap();
        client.start_worker(&worker).await.unwrap();

        let result = client
            .execute_workflow::<ParentWorkflow>("Jeff".to_string(), StartWorkflowOptions::new())
            .await
            .unwrap();
        assert_eq!(result, "parent got: WF1 says: Hello Jeff!");

        // The child inherits the parent's task queue
        let child = WorkflowExecuteChildRequest::try_from_message(
            proxy
                .received(MessageType::WorkflowExecuteChildRequest)
                .remove(0),
        )
        .unwrap();
        assert_eq!(child.workflow.as_deref(), Some("Workflow1"));
        assert_eq!(child.task_queue.as_deref(), Some("q1"));
        assert!(child.context_id.is_some());
    })
    .await;
}

#[tokio::test]
async fn test_signal_and_query_reach_running_workflow() {
    with_timeout("test_signal_and_query_reach_running_workflow", async {
        let (registry, proxy) = start_proxy();
        let client = ProxyClientBuilder::with_settings(settings("q1"))
            .register_workflow(SignalWorkflow)
            .build(&registry)
            .await
            .unwrap();
        let worker = client.new_worker(None, None, WorkerKind::Both).await.unwrap();
        client.start_worker(&worker).await.unwrap();

        let execution = client
            .start_workflow::<SignalWorkflow>((), StartWorkflowOptions::new().workflow_id("greeter-1"))
            .await
            .unwrap();
        assert_eq!(execution.workflow_id, "greeter-1");

        let result = tokio::spawn({
            let client = client.clone();
            let execution = execution.clone();
            async move { client.get_result::<String>(&execution).await }
        });
        proxy.wait_until_running("greeter-1").await;

        // The query handler is installed before the workflow blocks on the
        // signal, but the invocation may still be getting there
        let status = loop {
            match client
                .query_workflow::<(), String>(&execution, "status", &())
                .await
            {
                Ok(status) => break status,
                Err(_) => tokio::time::sleep(Duration::from_millis(5)).await,
            }
        };
        assert_eq!(status, "waiting for name");

        client
            .signal_workflow(&execution, "name", &"Jeff")
            .await
            .unwrap();
        assert_eq!(result.await.unwrap().unwrap(), "Hello Jeff!");
    })
    .await;
}

#[tokio::test]
async fn test_cancel_interrupts_running_workflow() {
    with_timeout("test_cancel_interrupts_running_workflow", async {
        let (registry, proxy) = start_proxy();
        let client = ProxyClientBuilder::with_settings(settings("q1"))
            .register_workflow(SignalWorkflow)
            .build(&registry)
            .await
            .unwrap();
        let worker = client.new_worker(None, None, WorkerKind::Both).await.unwrap();
        client.start_worker(&worker).await.unwrap();

        let execution = client
            .start_workflow::<SignalWorkflow>((), StartWorkflowOptions::new().workflow_id("doomed"))
            .await
            .unwrap();
        let result = tokio::spawn({
            let client = client.clone();
            async move { client.get_result::<String>(&execution).await }
        });
        proxy.wait_until_running("doomed").await;
        let target = proxy.last_invocation_id();

        let reply = proxy
            .invoke(CancelRequest {
                target_request_id: Some(target),
                ..Default::default()
            })
            .await;
        assert_eq!(reply.was_cancelled, Some(true));

        match result.await.unwrap().unwrap_err() {
            SdkError::RemoteFault { kind, .. } => assert_eq!(kind, ProxyErrorKind::Cancelled),
            other => panic!("unexpected {:?}", other),
        }

        // Nothing is in flight under that id any more
        let reply = proxy
            .invoke(CancelRequest {
                target_request_id: Some(target),
                ..Default::default()
            })
            .await;
        assert_eq!(reply.was_cancelled, Some(false));
    })
    .await;
}

#[tokio::test]
async fn test_workflow_failure_is_a_remote_fault() {
    with_timeout("test_workflow_failure_is_a_remote_fault", async {
        let (registry, _proxy) = start_proxy();
        let client = ProxyClientBuilder::with_settings(settings("q1"))
            .register_workflow(FailingWorkflow)
            .build(&registry)
            .await
            .unwrap();
        let worker = client.new_worker(None, None, WorkerKind::Both).await.unwrap();
        client.start_worker(&worker).await.unwrap();

        let err = client
            .execute_workflow::<FailingWorkflow>((), StartWorkflowOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteFault);
        assert!(err.to_string().contains("boom"));
    })
    .await;
}

#[derive(Default)]
struct Captured {
    starts: Mutex<Vec<EffectiveStartOptions>>,
    children: Mutex<Vec<(String, EffectiveChildOptions)>>,
    activities: Mutex<Vec<(String, EffectiveActivityOptions)>>,
    completed: Mutex<Vec<String>>,
    failed: Mutex<Vec<String>>,
}

#[derive(Clone, Default)]
struct CapturingHook(Arc<Captured>);

impl ClientHook for CapturingHook {
    fn on_workflow_start(&self, _client_id: u32, options: &EffectiveStartOptions) {
        self.0.starts.lock().push(options.clone());
    }

    fn on_child_workflow_start(
        &self,
        _client_id: u32,
        parent_workflow_id: &str,
        options: &EffectiveChildOptions,
    ) {
        self.0
            .children
            .lock()
            .push((parent_workflow_id.to_string(), options.clone()));
    }

    fn on_activity_execute(
        &self,
        _client_id: u32,
        workflow_id: &str,
        options: &EffectiveActivityOptions,
    ) {
        self.0
            .activities
            .lock()
            .push((workflow_id.to_string(), options.clone()));
    }

    fn on_workflow_completed(&self, _client_id: u32, workflow_type: &str, _workflow_id: &str) {
        self.0.completed.lock().push(workflow_type.to_string());
    }

    fn on_workflow_failed(
        &self,
        _client_id: u32,
        workflow_type: &str,
        _workflow_id: &str,
        _error: &str,
    ) {
        self.0.failed.lock().push(workflow_type.to_string());
    }
}

#[tokio::test]
async fn test_hook_sees_resolved_options() {
    with_timeout("test_hook_sees_resolved_options", async {
        let (registry, proxy) = start_proxy();
        let hook = CapturingHook::default();
        let client = ProxyClientBuilder::with_settings(settings("q1"))
            .register_hook(hook.clone())
            .register_workflow(ParentWorkflow)
            .register_workflow(Workflow1)
            .register_workflow(GreetingWorkflow)
            .register_workflow(FailingWorkflow)
            .register_activity(Greet)
            .build(&registry)
            .await
            .unwrap();
        let worker = client.new_worker(None, None, WorkerKind::Both).await.unwrap();
        client.start_worker(&worker).await.unwrap();

        client
            .execute_workflow::<ParentWorkflow>(
                "Jeff".to_string(),
                StartWorkflowOptions::new()
                    .workflow_id("parent-1")
                    .run_timeout(Duration::from_secs(90)),
            )
            .await
            .unwrap();
        client
            .execute_workflow::<GreetingWorkflow>("Jeff".to_string(), StartWorkflowOptions::new())
            .await
            .unwrap();
        client
            .execute_workflow::<FailingWorkflow>((), StartWorkflowOptions::new())
            .await
            .unwrap_err();

        let starts = hook.0.starts.lock().clone();
        assert_eq!(starts.len(), 3);
        assert_eq!(starts[0].workflow_type, "ParentWorkflow");
        assert_eq!(starts[0].workflow_id.as_deref(), Some("parent-1"));
        assert_eq!(starts[0].task_queue, "q1");
        assert_eq!(starts[0].run_timeout, Duration::from_secs(90));
        assert_eq!(
            starts[0].execution_timeout,
            client.settings().workflow_execution_timeout
        );

        // The request carries exactly what the hook saw
        let sent = WorkflowExecuteRequest::try_from_message(
            proxy.received(MessageType::WorkflowExecuteRequest).remove(0),
        )
        .unwrap();
        assert_eq!(sent.run_timeout, Some(chrono::TimeDelta::from_std(starts[0].run_timeout).unwrap()));
        assert_eq!(sent.task_queue.as_deref(), Some(starts[0].task_queue.as_str()));

        let children = hook.0.children.lock().clone();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].0, "parent-1");
        assert_eq!(children[0].1.workflow_type, "Workflow1");
        assert_eq!(children[0].1.task_queue, "q1");

        let activities = hook.0.activities.lock().clone();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].1.activity_type, "Greet");
        assert_eq!(activities[0].1.task_queue, "q1");

        let mut completed = hook.0.completed.lock().clone();
        completed.sort();
        assert_eq!(completed, vec!["GreetingWorkflow", "ParentWorkflow", "Workflow1"]);
        assert_eq!(hook.0.failed.lock().clone(), vec!["FailingWorkflow"]);
    })
    .await;
}

#[tokio::test]
async fn test_interface_attributes_pick_the_task_queue() {
    with_timeout("test_interface_attributes_pick_the_task_queue", async {
        let (registry, proxy) = start_proxy();
        let client = ProxyClientBuilder::with_settings(settings("q1"))
            .register_workflow(PinnedWorkflow)
            .build(&registry)
            .await
            .unwrap();
        let pinned = client
            .new_worker(None, Some("pinned"), WorkerKind::WorkflowOnly)
            .await
            .unwrap();
        client.start_worker(&pinned).await.unwrap();

        let queue = client
            .execute_workflow::<PinnedWorkflow>((), StartWorkflowOptions::new())
            .await
            .unwrap();
        assert_eq!(queue, "pinned");

        // Explicit options still win over the interface
        client
            .start_workflow::<PinnedWorkflow>((), StartWorkflowOptions::new().task_queue("q7"))
            .await
            .unwrap();
        let sent: Vec<_> = proxy
            .received(MessageType::WorkflowExecuteRequest)
            .into_iter()
            .map(|m| WorkflowExecuteRequest::try_from_message(m).unwrap())
            .collect();
        assert_eq!(sent[0].task_queue.as_deref(), Some("pinned"));
        assert_eq!(sent[0].execution_timeout, Some(chrono::TimeDelta::from_std(Duration::from_secs(120)).unwrap()));
        assert_eq!(sent[1].task_queue.as_deref(), Some("q7"));
    })
    .await;
}

#[tokio::test]
async fn test_signal_with_start_starts_then_signals() {
    with_timeout("test_signal_with_start_starts_then_signals", async {
        let (registry, proxy) = start_proxy();
        let client = ProxyClientBuilder::with_settings(settings("q1"))
            .register_workflow(SignalWorkflow)
            .build(&registry)
            .await
            .unwrap();
        let worker = client.new_worker(None, None, WorkerKind::Both).await.unwrap();
        client.start_worker(&worker).await.unwrap();

        let execution = client
            .signal_with_start::<SignalWorkflow, _>(
                (),
                "name",
                &"Ada",
                StartWorkflowOptions::new().workflow_id("greeter-sws"),
            )
            .await
            .unwrap();
        assert_eq!(execution.workflow_id, "greeter-sws");
        assert!(!execution.run_id.is_empty());
        assert_eq!(proxy.count(MessageType::WorkflowExecuteRequest), 0);

        let greeting: String = client.get_result(&execution).await.unwrap();
        assert_eq!(greeting, "Hello Ada!");
    })
    .await;
}

#[tokio::test]
async fn test_signal_with_start_needs_a_workflow_id() {
    with_timeout("test_signal_with_start_needs_a_workflow_id", async {
        let (registry, proxy) = start_proxy();
        let client = registry.connect(settings("q1")).await.unwrap();

        let err = client
            .signal_with_start::<SignalWorkflow, _>((), "name", &"Ada", StartWorkflowOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert_eq!(proxy.count(MessageType::WorkflowSignalWithStartRequest), 0);
    })
    .await;
}

#[tokio::test]
async fn test_describe_reports_status_and_history() {
    with_timeout("test_describe_reports_status_and_history", async {
        let (registry, _proxy) = start_proxy();
        let client = ProxyClientBuilder::with_settings(settings("q1"))
            .register_workflow(TimerWorkflow)
            .build(&registry)
            .await
            .unwrap();
        let worker = client
            .new_worker(None, None, WorkerKind::WorkflowOnly)
            .await
            .unwrap();
        client.start_worker(&worker).await.unwrap();

        let execution = client
            .start_workflow::<TimerWorkflow>(1, StartWorkflowOptions::new().workflow_id("timed"))
            .await
            .unwrap();
        let running = client.describe_workflow(&execution).await.unwrap();
        assert_eq!(running.status, WorkflowExecutionStatus::Running);
        assert_eq!(running.workflow_type, "TimerWorkflow");
        assert!(running.close_time.is_none());

        client.get_result::<(i64, i64)>(&execution).await.unwrap();
        let closed = client.describe_workflow(&execution).await.unwrap();
        assert_eq!(closed.status, WorkflowExecutionStatus::Completed);
        assert_eq!(closed.run_id, execution.run_id);
        assert!(closed.close_time.unwrap() >= closed.start_time);
        assert_eq!(closed.history_length, 3);
    })
    .await;
}

#[tokio::test]
async fn test_clock_and_timer_are_recorded_and_replayed() {
    with_timeout("test_clock_and_timer_are_recorded_and_replayed", async {
        let (registry, proxy) = start_proxy();
        let client = ProxyClientBuilder::with_settings(settings("q1"))
            .register_workflow(TimerWorkflow)
            .build(&registry)
            .await
            .unwrap();
        let worker = client
            .new_worker(None, None, WorkerKind::WorkflowOnly)
            .await
            .unwrap();
        client.start_worker(&worker).await.unwrap();

        let execution = client
            .start_workflow::<TimerWorkflow>(20, StartWorkflowOptions::new().workflow_id("nap"))
            .await
            .unwrap();
        let (before, after) = client.get_result::<(i64, i64)>(&execution).await.unwrap();
        assert!(after - before >= Duration::from_millis(20).as_nanos() as i64);

        let history = proxy.history("nap");
        let kinds: Vec<MarkerKind> = history.iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![MarkerKind::Now, MarkerKind::Sleep, MarkerKind::Now]);
        assert_eq!(history[0].value, json!(before));
        assert_eq!(history[1].value, json!(20_000_000));
        assert_eq!(proxy.count(MessageType::WorkflowSleepRequest), 1);

        // Replay reads the clock and skips the timer
        let replayed = proxy.replay_workflow("nap").await.unwrap().unwrap();
        let replayed: (i64, i64) = serde_json::from_slice(&replayed).unwrap();
        assert_eq!(replayed, (before, after));
        assert_eq!(proxy.count(MessageType::WorkflowSleepRequest), 1);
        assert_eq!(proxy.count(MessageType::WorkflowGetTimeRequest), 2);
    })
    .await;
}

#[tokio::test]
async fn test_local_activity_runs_on_the_workflow_client() {
    with_timeout("test_local_activity_runs_on_the_workflow_client", async {
        let (registry, proxy) = start_proxy();
        let client = ProxyClientBuilder::with_settings(settings("q1"))
            .register_workflow(LocalEchoWorkflow)
            .register_activity(Echo)
            .build(&registry)
            .await
            .unwrap();
        let worker = client
            .new_worker(None, None, WorkerKind::WorkflowOnly)
            .await
            .unwrap();
        client.start_worker(&worker).await.unwrap();

        let echoed = client
            .execute_workflow::<LocalEchoWorkflow>(json!({"sku": 7}), StartWorkflowOptions::default())
            .await
            .unwrap();
        assert_eq!(echoed, json!({"sku": 7}));
        assert_eq!(proxy.count(MessageType::ActivityExecuteLocalRequest), 1);
        assert_eq!(proxy.count(MessageType::ActivityExecuteRequest), 0);
    })
    .await;
}
