//! End-to-end scheduling tests over a live HTTP server with stubbed
//! protocol client and store.

mod common;

use common::{test_state, StubClient, StubStore};
use plcwatch::{create_app, WebConfig};
use serde_json::Value;
use std::time::Duration;

/// Serve the app on an ephemeral port and return its base URL.
async fn start_server(client: StubClient, store: StubStore) -> String {
    let app = create_app(&WebConfig::default(), test_state(client, store));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn get_json(url: &str) -> Value {
    reqwest::get(url).await.unwrap().json().await.unwrap()
}

#[tokio::test]
async fn test_interval_one_collects_repeatedly() {
    let base = start_server(StubClient::ok(), StubStore::empty()).await;

    let body = get_json(&format!("{base}/collector?action=start&interval=1")).await;
    assert_eq!(body["success"], true);

    // Immediate cycle plus at least one tick within ~3 seconds.
    tokio::time::sleep(Duration::from_secs(3)).await;
    let status = get_json(&format!("{base}/collector?action=status")).await;
    assert!(
        status["success_count"].as_u64().unwrap() >= 2,
        "status: {status}"
    );
    assert_eq!(status["error_count"], 0);
    assert!(status["last_success"].is_string());

    get_json(&format!("{base}/collector?action=stop")).await;
}

#[tokio::test]
async fn test_failing_plc_keeps_scheduler_alive() {
    let base = start_server(StubClient::failing(), StubStore::empty()).await;

    get_json(&format!("{base}/collector?action=start&interval=1")).await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    // Every cycle fails, none succeed, and status still answers.
    let status = get_json(&format!("{base}/collector?action=status")).await;
    assert!(status["error_count"].as_u64().unwrap() >= 2, "status: {status}");
    assert_eq!(status["success_count"], 0);
    assert_eq!(status["running"], true);

    get_json(&format!("{base}/collector?action=stop")).await;
}

#[tokio::test]
async fn test_read_now_during_slow_cycle_is_busy() {
    let client = StubClient {
        fail: false,
        delay: Duration::from_millis(800),
    };
    let base = start_server(client, StubStore::empty()).await;
    let http = reqwest::Client::new();

    // Kick off a slow out-of-band cycle.
    let read_url = format!("{base}/collector?action=read");
    let slow = tokio::spawn({
        let http = http.clone();
        let read_url = read_url.clone();
        async move { http.get(&read_url).send().await.unwrap().status() }
    });
    tokio::time::sleep(Duration::from_millis(150)).await;

    // The second read must be rejected, not queued.
    let busy = http.get(&read_url).send().await.unwrap();
    assert_eq!(busy.status(), 503);

    assert_eq!(slow.await.unwrap(), 200);

    // The overlapping window produced exactly one counted cycle.
    let status = get_json(&format!("{base}/collector?action=status")).await;
    let total =
        status["success_count"].as_u64().unwrap() + status["error_count"].as_u64().unwrap();
    assert_eq!(total, 1, "status: {status}");
}

#[tokio::test]
async fn test_stop_halts_future_cycles() {
    let base = start_server(StubClient::ok(), StubStore::empty()).await;

    get_json(&format!("{base}/collector?action=start&interval=1")).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    get_json(&format!("{base}/collector?action=stop")).await;

    let before = get_json(&format!("{base}/collector?action=status")).await;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let after = get_json(&format!("{base}/collector?action=status")).await;

    assert_eq!(after["success_count"], before["success_count"]);
    assert_eq!(after["running"], false);
}
