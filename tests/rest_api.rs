//! REST surface over a live listener.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

async fn get(gateway: &TestGateway, path: &str) -> (u16, Value) {
    let resp = reqwest::get(gateway.http_url(path)).await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn health_and_status_report_counts() {
    let gateway = start_default().await;
    let (_ws, _) = connect(&gateway).await;

    let (status, health) = get(&gateway, "/health").await;
    assert_eq!(status, 200);
    assert_eq!(health["status"], "ok");
    assert_eq!(health["clients"], 1);

    let (_, info) = get(&gateway, "/api/status").await;
    assert_eq!(info["status"], "running");
    assert_eq!(info["stats"]["activeClients"], 1);
    assert_eq!(info["stats"]["totalConnections"], 1);
    assert!(info["latestData"].is_null());
}

#[tokio::test]
async fn sensor_endpoint_reflects_latest_frame() {
    let gateway = start_default().await;
    let (mut device, _) = connect_device(&gateway, "ESP32-S3").await;
    send_json(&mut device, json!({ "type": "sensor_data", "voc": 42 })).await;
    recv_type(&mut device, "sensor_ack").await;

    let (_, body) = get(&gateway, "/api/sensor").await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["voc"], 42.0);

    let (_, history) = get(&gateway, "/api/history").await;
    assert_eq!(history["count"], 1);
}

#[tokio::test]
async fn login_then_control_reaches_sessions() {
    let gateway = start_default().await;
    let (mut viewer, _) = connect(&gateway).await;
    let http = reqwest::Client::new();

    let unauthorized = http
        .post(gateway.http_url("/api/control"))
        .json(&json!({ "action": "ON" }))
        .send()
        .await
        .unwrap();
    assert_eq!(unauthorized.status().as_u16(), 401);

    let login: Value = http
        .post(gateway.http_url("/api/auth/login"))
        .json(&json!({ "username": "admin", "password": "admin123" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(login["success"], true);
    assert_eq!(login["user"]["role"], "admin");
    let token = login["token"].as_str().unwrap().to_string();

    let me: Value = http
        .get(gateway.http_url("/api/auth/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["user"]["username"], "admin");

    let sent: Value = http
        .post(gateway.http_url("/api/control"))
        .bearer_auth(&token)
        .json(&json!({ "action": "OFF" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(sent["success"], true);
    assert_eq!(sent["sentTo"], 1);

    let frame = recv_type(&mut viewer, "control").await;
    assert_eq!(frame["action"], "OFF");
    assert_eq!(frame["source"], "admin");
}

#[tokio::test]
async fn me_rejects_garbage_token() {
    let gateway = start_default().await;
    let resp = reqwest::Client::new()
        .get(gateway.http_url("/api/auth/me"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);
}
