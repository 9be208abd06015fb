mod shared;

use std::time::{Duration, Instant};

use chrono::Utc;
use procwatch::USER_AGENT;
use procwatch::config::BackendConfig;
use procwatch::delivery::{DeliveryClient, DeliveryError};
use procwatch_shared::{ProcessRecord, SnapshotPayload};
use reqwest::StatusCode;
use shared::{StubServer, closed_url};

fn backend(url: String, max_retries: u32, retry_delay_secs: f64) -> BackendConfig {
    BackendConfig {
        url,
        api_key: "secret".to_string(),
        request_timeout_secs: 5,
        max_retries,
        retry_delay_secs,
    }
}

fn payload() -> SnapshotPayload {
    let process = ProcessRecord {
        pid: 1,
        name: "init".to_string(),
        cpu_percent: 0.5,
        memory_mb: 12.25,
        parent_pid: None,
        command_line: String::new(),
        status: "sleeping".to_string(),
        create_time: Some(1_700_000_000.0),
        has_children: Some(false),
    };
    SnapshotPayload::new("web-01", Utc::now(), vec![process], "secret")
}

const RECEIPT: &str = r#"{"status": "success", "message": "Processed 1 processes", "snapshot_id": 42}"#;

#[test_log::test(tokio::test)]
async fn test_delivered_on_first_attempt() {
    let server = StubServer::fixed(200, RECEIPT).await;
    let client = DeliveryClient::new(&backend(server.url(), 3, 0.1)).unwrap();

    let delivered = client.deliver(&payload()).await.unwrap();
    assert_eq!(delivered.attempts, 1);
    assert_eq!(delivered.status, StatusCode::OK);
    assert_eq!(delivered.receipt.unwrap().snapshot_id, 42);

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/api/processes/");
    assert_eq!(request.header("user-agent"), Some(USER_AGENT));
    assert_eq!(request.header("content-type"), Some("application/json"));

    let sent: SnapshotPayload = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(sent.hostname, "web-01");
    assert_eq!(sent.api_key, "secret");
    assert_eq!(sent.processes, payload().processes);
}

#[tokio::test]
async fn test_retry_bound() {
    let server = StubServer::fixed(503, r#"{"error": "Unexpected error", "details": "db locked"}"#).await;
    let delay = Duration::from_millis(200);
    let client = DeliveryClient::new(&backend(server.url(), 3, delay.as_secs_f64())).unwrap();

    let started = Instant::now();
    let err = client.deliver(&payload()).await.unwrap_err();
    // Two delays between three attempts, none after the last one
    assert!(started.elapsed() < delay * 3);
    match err {
        DeliveryError::Exhausted {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 3);
            match *last_error {
                DeliveryError::Rejected { status, reason } => {
                    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                    assert_eq!(reason, "Unexpected error");
                }
                other => panic!("unexpected last error: {other}"),
            }
        }
        other => panic!("unexpected error: {other}"),
    }

    let requests = server.requests();
    assert_eq!(requests.len(), 3);
    for pair in requests.windows(2) {
        assert!(pair[1].received_at - pair[0].received_at >= delay);
    }
}

#[tokio::test]
async fn test_recovers_after_transient_failures() {
    let server = StubServer::start(|index, _| async move {
        if index < 2 {
            (500, r#"{"error": "Unexpected error"}"#.to_string())
        } else {
            (200, RECEIPT.to_string())
        }
    })
    .await;
    let client = DeliveryClient::new(&backend(server.url(), 3, 0.05)).unwrap();

    let delivered = client.deliver(&payload()).await.unwrap();
    assert_eq!(delivered.attempts, 3);
    assert_eq!(server.requests().len(), 3);
}

#[tokio::test]
async fn test_transport_errors_are_retried() {
    let client = DeliveryClient::new(&backend(closed_url().await, 2, 0.05)).unwrap();

    let err = client.deliver(&payload()).await.unwrap_err();
    assert!(matches!(
        err,
        DeliveryError::Exhausted { attempts: 2, ref last_error }
            if matches!(**last_error, DeliveryError::Transport(_))
    ));
}

#[tokio::test]
async fn test_success_does_not_depend_on_body() {
    let server = StubServer::fixed(202, "accepted").await;
    let client = DeliveryClient::new(&backend(server.url(), 3, 0.05)).unwrap();

    let delivered = client.deliver(&payload()).await.unwrap();
    assert_eq!(delivered.status, StatusCode::ACCEPTED);
    assert_eq!(delivered.receipt, None);
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn test_unauthorized_reason() {
    let server = StubServer::fixed(401, r#"{"error": "Invalid API key", "details": null}"#).await;
    let client = DeliveryClient::new(&backend(server.url(), 1, 0.0)).unwrap();

    let err = client.deliver(&payload()).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "failed to deliver snapshot after 1 attempts, last error: backend returned 401 Unauthorized: \
         Invalid API key (check that backend.api-key matches the store)"
    );
}
