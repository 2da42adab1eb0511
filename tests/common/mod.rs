//! Shared helpers for the integration tests: a gateway on an ephemeral
//! port plus a thin WebSocket client.

#![allow(dead_code)]

use cleankiln::config::Config;
use cleankiln::gateway::{GatewayServer, GatewayState};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Config with cheap bcrypt, a fixed JWT secret and analysis switched off.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.bcrypt_cost = 4;
    config.auth.jwt_secret = Some("integration-secret".to_string());
    config.analysis.enabled = false;
    config
}

pub struct TestGateway {
    pub addr: SocketAddr,
    pub state: GatewayState,
    pub shutdown: CancellationToken,
    pub handle: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl TestGateway {
    pub fn ws_url(&self) -> String {
        format!("ws://{}/", self.addr)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start(state: GatewayState) -> TestGateway {
    let server = GatewayServer::bind(state, "127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = server.addr();
    let state = server.state().clone();
    let shutdown = server.shutdown_handle();
    let handle = tokio::spawn(server.run_until_shutdown());
    TestGateway {
        addr,
        state,
        shutdown,
        handle,
    }
}

pub async fn start_default() -> TestGateway {
    start(GatewayState::with_provider(test_config(), None).unwrap()).await
}

/// Connect and consume the welcome frame.
pub async fn connect(gateway: &TestGateway) -> (Client, u64) {
    let (mut ws, _) = connect_async(gateway.ws_url()).await.unwrap();
    let welcome = recv_type(&mut ws, "welcome").await;
    let id = welcome["clientId"].as_u64().unwrap();
    (ws, id)
}

pub async fn send_json(ws: &mut Client, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

/// Next text frame, parsed as JSON.
pub async fn recv_json(ws: &mut Client) -> Value {
    loop {
        let msg = timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .unwrap();
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Close(frame) => panic!("socket closed: {:?}", frame),
            _ => continue,
        }
    }
}

/// Skip frames until one with the given `type` arrives.
pub async fn recv_type(ws: &mut Client, kind: &str) -> Value {
    loop {
        let frame = recv_json(ws).await;
        if frame["type"] == kind {
            return frame;
        }
    }
}

/// Connect, announce as a device and wait for the acknowledgement.
pub async fn connect_device(gateway: &TestGateway, name: &str) -> (Client, u64) {
    let (mut ws, id) = connect(gateway).await;
    send_json(
        &mut ws,
        serde_json::json!({ "type": "init", "device": name }),
    )
    .await;
    recv_type(&mut ws, "init_ack").await;
    (ws, id)
}
