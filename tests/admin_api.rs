//! Full stack: admin API, listener and shutdown over real sockets.

use std::sync::Arc;
use std::time::Duration;

use lifecycle_manager::config::AppConfig;
use lifecycle_manager::lifecycle::startup::{self, Services};
use lifecycle_manager::lifecycle::{Phase, TerminationKind};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

mod common;

use common::{RecordingExit, StaticProbe};

const API_KEY: &str = "test-admin-key";

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.admin.enabled = true;
    config.admin.bind_address = "127.0.0.1:0".into();
    config.admin.api_key = API_KEY.into();
    config.health.enabled = false;
    config.lifecycle.drain_timeout_secs = 1;
    config.lifecycle.drain_poll_interval_ms = 50;
    config
}

async fn start_stack() -> (Services, Arc<RecordingExit>) {
    let exit = Arc::new(RecordingExit::default());
    let services = startup::start(
        test_config(),
        None,
        Arc::new(StaticProbe::new(100, 1000)),
        exit.clone(),
    )
    .await
    .unwrap();
    (services, exit)
}

fn admin_url(services: &Services, path: &str) -> String {
    format!("http://{}{}", services.admin_addr.unwrap(), path)
}

#[tokio::test]
async fn test_admin_requires_api_key() {
    let (services, _exit) = start_stack().await;
    let client = reqwest::Client::new();

    let missing = client
        .get(admin_url(&services, "/admin/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = client
        .post(admin_url(&services, "/admin/restart"))
        .bearer_auth("not-the-key")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(services.manager.snapshot().queue_length, 0);
}

#[tokio::test]
async fn test_status_reports_snapshot() {
    let (services, _exit) = start_stack().await;

    let status: Value = reqwest::Client::new()
        .get(admin_url(&services, "/admin/status"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(status["phase"], "running");
    assert_eq!(status["shutting_down"], false);
    assert_eq!(status["active_connections"], 0);
    assert_eq!(status["queue_length"], 0);
    assert_eq!(status["memory"]["used_bytes"], 100);
}

#[tokio::test]
async fn test_restart_endpoint_queues_request() {
    let (services, _exit) = start_stack().await;
    let client = reqwest::Client::new();

    let response = client
        .post(admin_url(&services, "/admin/restart"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let request: Value = response.json().await.unwrap();
    assert_eq!(request["reason"], "manual_restart");
    assert_eq!(request["priority"], "medium");
    assert_eq!(request["metadata"]["source"], "admin-api");

    let response = client
        .post(admin_url(&services, "/admin/restart"))
        .bearer_auth(API_KEY)
        .json(&serde_json::json!({
            "reason": "configuration_reload",
            "metadata": { "ticket": "OPS-7" }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let request: Value = response.json().await.unwrap();
    assert_eq!(request["reason"], "configuration_reload");
    assert_eq!(request["priority"], "medium");
    assert_eq!(request["metadata"]["ticket"], "OPS-7");

    assert_eq!(services.manager.snapshot().queue_length, 2);
}

#[tokio::test]
async fn test_restart_endpoint_rejects_bad_body() {
    let (services, _exit) = start_stack().await;

    let response = reqwest::Client::new()
        .post(admin_url(&services, "/admin/restart"))
        .bearer_auth(API_KEY)
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(services.manager.snapshot().queue_length, 0);
}

#[tokio::test]
async fn test_restart_endpoint_rejects_health_reasons() {
    let (services, _exit) = start_stack().await;
    let client = reqwest::Client::new();

    for reason in ["high_memory_usage", "too_many_connections", "canary_rollout"] {
        let response = client
            .post(admin_url(&services, "/admin/restart"))
            .bearer_auth(API_KEY)
            .json(&serde_json::json!({ "reason": reason }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{reason}");
        assert!(response.text().await.unwrap().contains(reason));
    }

    assert_eq!(services.manager.snapshot().queue_length, 0);
}

#[tokio::test]
async fn test_restart_endpoint_refuses_during_shutdown() {
    let (services, _exit) = start_stack().await;
    let client = reqwest::Client::new();

    let mut stream = TcpStream::connect(services.listener_addr).await.unwrap();
    stream.write_all(b"ping\n").await.unwrap();
    let mut line = String::new();
    BufReader::new(&mut stream).read_line(&mut line).await.unwrap();

    let shutdown = tokio::spawn({
        let manager = services.manager.clone();
        async move { manager.graceful_shutdown("SIGTERM").await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let response = client
        .post(admin_url(&services, "/admin/restart"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    drop(stream);
    shutdown.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_listener_echoes_and_is_tracked() {
    let (services, _exit) = start_stack().await;

    let mut stream = TcpStream::connect(services.listener_addr).await.unwrap();
    stream.write_all(b"hello\n").await.unwrap();
    let mut line = String::new();
    BufReader::new(&mut stream).read_line(&mut line).await.unwrap();

    assert_eq!(line, "hello\n");
    assert_eq!(services.manager.registry().active_count(), 1);

    drop(stream);
    for _ in 0..50 {
        if services.manager.registry().active_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(services.manager.registry().active_count(), 0);
}

#[tokio::test]
async fn test_shutdown_force_closes_idle_client() {
    let (services, exit) = start_stack().await;

    let mut stream = TcpStream::connect(services.listener_addr).await.unwrap();
    stream.write_all(b"ping\n").await.unwrap();
    let mut reader = BufReader::new(&mut stream);
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();

    let termination = services.manager.graceful_shutdown("SIGTERM").await.unwrap();

    assert_eq!(termination.kind, TerminationKind::Shutdown);
    assert_eq!(termination.forced_closures, 1);
    assert_eq!(termination.exit_code, 0);
    assert_eq!(services.manager.phase(), Phase::Terminated);
    assert_eq!(exit.calls().len(), 1);

    // The server side closes the socket once killed.
    let mut rest = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(2), reader.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read, 0);
}
