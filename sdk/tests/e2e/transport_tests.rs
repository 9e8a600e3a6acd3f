//! Transport E2E tests
//!
//! Connection loss, heartbeats and frames the SDK did not ask for.

use crate::{init_tracing, settings, start_proxy, with_timeout, FakeProxy};
use chrono::Utc;
use durable_proxy_core::protocol::messages::{HeartbeatRequest, LogRequest, PingReply};
use durable_proxy_core::{MessageType, TypedMessage};
use durable_proxy_sdk::error::ErrorKind;
use durable_proxy_sdk::TransportConfig;
use std::time::Duration;

#[tokio::test]
async fn test_unanswered_heartbeats_lose_the_connection() {
    with_timeout("test_unanswered_heartbeats_lose_the_connection", async {
        init_tracing();
        let config = TransportConfig::new(
            Duration::from_millis(50),
            Duration::from_millis(50),
            2,
            Some(Duration::from_secs(5)),
        )
        .unwrap();
        let (registry, proxy) = FakeProxy::start(config);
        let client = registry.connect(settings("q1")).await.unwrap();

        // Answered heartbeats keep the connection up
        while proxy.count(MessageType::HeartbeatRequest) < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(client.is_connected());

        proxy.set_answer_heartbeats(false);
        while registry.transport().is_connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!client.is_connected());

        let err = client.ping().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionLost);
        assert!(err.to_string().contains("heartbeats unanswered"));
    })
    .await;
}

#[tokio::test]
async fn test_hang_up_fails_pending_and_new_calls() {
    with_timeout("test_hang_up_fails_pending_and_new_calls", async {
        let (registry, proxy) = start_proxy();
        let client = registry.connect(settings("q1")).await.unwrap();

        // An unanswered heartbeat stays pending until the pipe closes
        proxy.set_answer_heartbeats(false);
        let pending = tokio::spawn({
            let transport = registry.transport().clone();
            async move { transport.call(HeartbeatRequest::default()).await }
        });
        while proxy.count(MessageType::HeartbeatRequest) < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(registry.transport().pending_requests(), 1);

        proxy.hang_up();
        let err = pending.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionLost);
        assert_eq!(registry.transport().pending_requests(), 0);

        let err = client.ping().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionLost);
        assert!(!client.is_connected());
    })
    .await;
}

#[tokio::test]
async fn test_reply_without_a_request_is_ignored() {
    with_timeout("test_reply_without_a_request_is_ignored", async {
        let (registry, proxy) = start_proxy();
        let client = registry.connect(settings("q1")).await.unwrap();

        let mut stray = PingReply::default().into_message().unwrap();
        stray.set_request_id(4242);
        stray.set_client_id(client.client_id());
        proxy.send_raw(stray);

        client.ping().await.unwrap();
        assert!(client.is_connected());
    })
    .await;
}

#[tokio::test]
async fn test_proxy_log_lines_are_acknowledged() {
    with_timeout("test_proxy_log_lines_are_acknowledged", async {
        let (registry, proxy) = start_proxy();
        let client = registry.connect(settings("q1")).await.unwrap();

        let reply = proxy
            .invoke(LogRequest {
                client_id: client.client_id(),
                time: Some(Utc::now()),
                log_level: Some("Warn".to_string()),
                from_proxy: Some(true),
                log_message: Some("worker poller restarted".to_string()),
                ..Default::default()
            })
            .await;
        assert!(reply.error.is_none());
        assert!(client.is_connected());
    })
    .await;
}
