//! Per-connection tasks and the inbound frame pipeline.
//!
//! The pump loop only runs for `sensor_data` frames that carry a moisture
//! field. Frames without one produce no `auto_control` and no
//! `status_pompa`, unlike the Node server, which treated a missing
//! reading as 0 and commanded the pump on.

use crate::gateway::protocol::{DeviceStatusKind, OutboundFrame};
use crate::gateway::registry::{Outbound, Session, SessionRole};
use crate::gateway::server::GatewayState;
use crate::telemetry::codec::{self, MOISTURE_ALIASES, UNKNOWN_DEVICE};
use crate::telemetry::{classify, decide, decode, normalize, DecodeError, Frame};

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Budget for flushing a close frame once the session is cancelled.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// How long teardown waits for the writer before aborting it.
const WRITER_GRACE: Duration = Duration::from_secs(3);

/// Handle one device or dashboard connection.
///
/// Flow:
/// 1. Register the session and spawn its writer task
/// 2. Send `welcome`
/// 3. Decode and dispatch inbound frames in arrival order
/// 4. On close, error or termination: deregister and announce the departure
pub async fn handle_websocket(socket: WebSocket, state: GatewayState, addr: SocketAddr) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Outbound>(state.config.gateway.outbound_queue);

    let session = state.registry.register(tx);
    let client_id = session.id;
    let cancel = session.cancel_token().clone();
    info!(
        "Client #{} connected from {} ({} open)",
        client_id,
        addr,
        state.registry.len()
    );

    // Writer: drains the queue first so a close frame queued just before
    // cancellation still goes out. Once cancelled, data frames are skipped
    // and no write may outlive the cancellation by more than CLOSE_GRACE,
    // so a peer that stopped reading cannot pin the task.
    let writer_cancel = cancel.clone();
    let mut writer = tokio::spawn(async move {
        loop {
            let item = tokio::select! {
                biased;
                item = rx.recv() => item,
                _ = writer_cancel.cancelled() => None,
            };
            let Some(item) = item else { break };

            let message = match item {
                Outbound::Close { code, reason } => {
                    let frame = Message::Close(Some(CloseFrame {
                        code,
                        reason: reason.into(),
                    }));
                    if timeout(CLOSE_GRACE, ws_tx.send(frame)).await.is_err() {
                        debug!("Close frame to client #{} timed out", client_id);
                    }
                    break;
                }
                _ if writer_cancel.is_cancelled() => continue,
                Outbound::Text(text) => Message::Text(text.into()),
                Outbound::Ping => Message::Ping(Vec::new().into()),
            };

            let result = tokio::select! {
                result = ws_tx.send(message) => result,
                _ = writer_cancel.cancelled() => {
                    debug!("Write to client #{} abandoned on cancellation", client_id);
                    break;
                }
            };
            if let Err(e) = result {
                debug!("WebSocket write failed for client #{}: {}", client_id, e);
                writer_cancel.cancel();
                break;
            }
        }
        let _ = timeout(CLOSE_GRACE, ws_tx.close()).await;
    });

    state
        .fanout
        .send_to(&session, &OutboundFrame::welcome(client_id));

    let mut close_code: Option<u16> = None;
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = ws_rx.next() => msg,
        };

        match msg {
            Some(Ok(Message::Text(text))) => {
                handle_payload(&state, client_id, text.as_bytes());
            }
            Some(Ok(Message::Binary(bytes))) => {
                handle_payload(&state, client_id, &bytes);
            }
            Some(Ok(Message::Pong(_))) => {
                state.registry.mark_alive(client_id);
            }
            Some(Ok(Message::Ping(_))) => {
                // Pong is sent automatically; a ping still proves liveness.
                state.registry.mark_alive(client_id);
            }
            Some(Ok(Message::Close(frame))) => {
                close_code = frame.as_ref().map(|f| f.code);
                break;
            }
            Some(Err(e)) => {
                warn!("WebSocket error for client #{}: {}", client_id, e);
                break;
            }
            None => break,
        }
    }

    cancel.cancel();
    match timeout(WRITER_GRACE, &mut writer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Writer task for client #{} failed: {}", client_id, e),
        Err(_) => {
            warn!("Writer for client #{} stuck on a full socket; aborting", client_id);
            writer.abort();
        }
    }

    let duration = session.connected_at.elapsed();
    // `None` here means the liveness supervisor already removed and
    // announced it.
    if let Some(gone) = state.registry.deregister(client_id) {
        state.fanout.announce_offline(&gone);
    }

    info!(
        "Client #{} disconnected after {:.1}s (code {}: {}); {} remaining",
        client_id,
        duration.as_secs_f64(),
        close_code.map_or_else(|| "-".to_string(), |c| c.to_string()),
        describe_close_code(close_code),
        state.registry.len()
    );
}

/// Decode one payload and run it through the pipeline.
pub fn handle_payload(state: &GatewayState, client_id: u64, payload: &[u8]) {
    let Some(session) = state.registry.get(client_id) else {
        return;
    };

    let frame = match decode(payload) {
        Ok(frame) => frame,
        Err(DecodeError::Empty) => return,
        Err(e) => {
            debug!("Client #{}: {}", client_id, e);
            state.fanout.send_to(
                &session,
                &OutboundFrame::Ack {
                    message: "Message received".to_string(),
                    timestamp: Utc::now(),
                },
            );
            return;
        }
    };

    debug!("Client #{} sent {}", client_id, classify(&frame).as_str());
    match frame {
        Frame::Keepalive => {
            state.registry.mark_alive(client_id);
        }
        Frame::Init { device } => handle_init(state, &session, device),
        Frame::SensorData(raw) => handle_sensor_data(state, &session, raw),
        Frame::RelayStatus { state: relay, timestamp } => {
            note_role(state, &session, SessionRole::Device);
            info!("Client #{} relay: {}", client_id, relay);
            state.fanout.broadcast(&OutboundFrame::RelayUpdate {
                state: relay,
                timestamp,
                client_id,
            });
        }
        Frame::Unknown { kind } => {
            note_role(state, &session, SessionRole::Viewer);
            debug!(
                "Client #{} sent unknown frame type {:?}",
                client_id,
                kind.as_deref().unwrap_or("<none>")
            );
        }
    }
}

fn note_role(state: &GatewayState, session: &Session, role: SessionRole) {
    if session.role == SessionRole::Unknown {
        if let Some(role) = state.registry.infer_role(session.id, role) {
            info!("Client #{} identified as {:?}", session.id, role);
        }
    }
}

fn handle_init(state: &GatewayState, session: &Session, device: Option<String>) {
    note_role(state, session, SessionRole::Device);
    if let Some(name) = device.as_deref() {
        state.registry.set_device_name(session.id, name);
    }
    let name = device.as_deref().unwrap_or(session.display_name());
    info!("Client #{} initialized as device '{}'", session.id, name);

    state.fanout.send_to(
        session,
        &OutboundFrame::InitAck {
            message: "Device registered".to_string(),
            client_id: session.id,
        },
    );
    state.fanout.broadcast(&OutboundFrame::device_status(
        name,
        DeviceStatusKind::Online,
        session.id,
    ));
}

/// Cache, alert, control, fan-out, then maybe analyze.
fn handle_sensor_data(state: &GatewayState, session: &Session, raw: Map<String, Value>) {
    note_role(state, session, SessionRole::Device);

    let mut snapshot = normalize(&raw).with_origin(session.id);
    if snapshot.device == UNKNOWN_DEVICE {
        if let Some(name) = state.registry.get(session.id).and_then(|s| s.device_name) {
            snapshot.device = name;
        }
    }
    debug!(
        "Client #{} sensors: VOC={} PM2.5={} PM10={} T={} moisture={}",
        session.id, snapshot.voc, snapshot.pm25, snapshot.pm10, snapshot.temperature, snapshot.moisture
    );

    state.latest.publish(snapshot.clone());

    state.fanout.send_to(
        session,
        &OutboundFrame::SensorAck {
            moisture: snapshot.moisture,
            timestamp: Utc::now(),
        },
    );

    let (_, alerts) = state.alerts.lock().evaluate(&snapshot);

    let command = if state.config.control.enabled && codec::reports(&raw, MOISTURE_ALIASES) {
        let command = decide(snapshot.moisture);
        info!(
            "Client #{} moisture {}% -> pump {:?}",
            session.id, snapshot.moisture, command.action
        );
        state
            .fanout
            .send_to(session, &OutboundFrame::AutoControl(command.clone()));
        Some(command)
    } else {
        None
    };

    state
        .fanout
        .broadcast(&OutboundFrame::SensorData(snapshot.clone()));

    for alert in alerts {
        warn!("{}", alert.message);
        state.fanout.broadcast(&OutboundFrame::Alert(alert));
    }

    if let Some(command) = command {
        state.fanout.broadcast(&OutboundFrame::StatusPompa {
            status: command.action.pump_status().to_string(),
            moisture: command.moisture,
        });
    }

    state.analysis.maybe_trigger(&snapshot);
}

/// Describe a WebSocket close code for logs.
pub fn describe_close_code(code: Option<u16>) -> &'static str {
    match code {
        None => "no close frame",
        Some(1000) => "normal closure",
        Some(1001) => "going away",
        Some(1005) => "no status received",
        Some(1006) => "abnormal closure",
        Some(1008) => "policy violation",
        Some(1009) => "message too big",
        Some(1011) => "internal error",
        Some(_) => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn state() -> GatewayState {
        let mut config = Config::default();
        config.auth.bcrypt_cost = 4;
        config.auth.jwt_secret = Some("test".to_string());
        config.analysis.enabled = false;
        GatewayState::with_provider(config, None).unwrap()
    }

    fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let Outbound::Text(json) = item {
                frames.push(serde_json::from_str(&json).unwrap());
            }
        }
        frames
    }

    fn types(frames: &[Value]) -> Vec<&str> {
        frames.iter().filter_map(|f| f["type"].as_str()).collect()
    }

    #[tokio::test]
    async fn sensor_data_pipeline_order() {
        let state = state();
        let (dev_tx, mut dev_rx) = mpsc::channel(32);
        let (view_tx, mut view_rx) = mpsc::channel(32);
        let device = state.registry.register(dev_tx);
        state.registry.register(view_tx);

        handle_payload(
            &state,
            device.id,
            br#"{"type":"sensor_data","moisture":12,"pm25":60,"device":"kiln-1"}"#,
        );

        let to_device = drain(&mut dev_rx);
        assert_eq!(
            types(&to_device),
            vec!["sensor_ack", "auto_control", "sensor_data", "alert", "status_pompa"]
        );
        assert_eq!(to_device[1]["action"], "ON");

        let to_viewer = drain(&mut view_rx);
        assert_eq!(types(&to_viewer), vec!["sensor_data", "alert", "status_pompa"]);
        assert_eq!(to_viewer[0]["status"], "danger");
        assert_eq!(to_viewer[0]["clientId"], device.id);
        assert_eq!(to_viewer[2]["status"], "WATERING");

        let cached = state.latest.read().unwrap();
        assert_eq!(cached.device, "kiln-1");
        assert_eq!(
            state.registry.get(device.id).unwrap().role,
            SessionRole::Device
        );
    }

    #[tokio::test]
    async fn no_moisture_field_means_no_command() {
        let state = state();
        let (tx, mut rx) = mpsc::channel(32);
        let device = state.registry.register(tx);

        handle_payload(&state, device.id, br#"{"type":"sensor_data","voc":50}"#);

        let frames = drain(&mut rx);
        assert_eq!(types(&frames), vec!["sensor_ack", "sensor_data"]);
    }

    #[tokio::test]
    async fn malformed_payloads_are_acknowledged() {
        let state = state();
        let (tx, mut rx) = mpsc::channel(32);
        let session = state.registry.register(tx);

        handle_payload(&state, session.id, b"hello there");
        handle_payload(&state, session.id, b"[1,2,3]");
        handle_payload(&state, session.id, b"   ");

        let frames = drain(&mut rx);
        assert_eq!(types(&frames), vec!["ack", "ack"]);
        assert_eq!(frames[0]["message"], "Message received");
        assert!(state.registry.get(session.id).is_some());
    }

    #[tokio::test]
    async fn init_names_the_device_for_later_readings() {
        let state = state();
        let (dev_tx, mut dev_rx) = mpsc::channel(32);
        let (view_tx, mut view_rx) = mpsc::channel(32);
        let device = state.registry.register(dev_tx);
        state.registry.register(view_tx);

        handle_payload(&state, device.id, br#"{"type":"init","device":"kiln-probe"}"#);
        assert_eq!(types(&drain(&mut dev_rx))[0], "init_ack");
        let online = drain(&mut view_rx);
        assert_eq!(online[0]["type"], "device_status");
        assert_eq!(online[0]["status"], "online");
        assert_eq!(online[0]["device"], "kiln-probe");

        handle_payload(&state, device.id, br#"{"type":"sensor_data","pm25":5}"#);
        assert_eq!(state.latest.read().unwrap().device, "kiln-probe");
    }

    #[tokio::test]
    async fn unknown_frames_mark_viewers_and_keepalive_marks_alive() {
        let state = state();
        let (tx, _rx) = mpsc::channel(32);
        let session = state.registry.register(tx);

        handle_payload(&state, session.id, br#"{"type":"subscribe"}"#);
        assert_eq!(
            state.registry.get(session.id).unwrap().role,
            SessionRole::Viewer
        );

        state.registry.clear_alive(session.id);
        handle_payload(&state, session.id, b" PING ");
        assert!(state.registry.get(session.id).unwrap().alive);
    }

    #[tokio::test]
    async fn relay_status_is_relayed() {
        let state = state();
        let (dev_tx, _dev_rx) = mpsc::channel(32);
        let (view_tx, mut view_rx) = mpsc::channel(32);
        let device = state.registry.register(dev_tx);
        state.registry.register(view_tx);

        handle_payload(
            &state,
            device.id,
            br#"{"type":"relay_status","state":"ON","timestamp":12345}"#,
        );
        let frames = drain(&mut view_rx);
        assert_eq!(frames[0]["type"], "relay_update");
        assert_eq!(frames[0]["state"], "ON");
        assert_eq!(frames[0]["timestamp"], 12345);
    }

    #[test]
    fn close_codes_are_described() {
        assert_eq!(describe_close_code(Some(1000)), "normal closure");
        assert_eq!(describe_close_code(None), "no close frame");
        assert_eq!(describe_close_code(Some(4000)), "other");
    }
}
