use crate::gateway::auth::{AuthError, UserProfile};
use crate::gateway::protocol::OutboundFrame;
use crate::gateway::registry::SessionInfo;
use crate::gateway::server::GatewayState;
use crate::gateway::websocket;
use crate::telemetry::{AlertEvent, SensorSnapshot, SensorStats, Threshold};

use axum::{
    body::Bytes,
    extract::{ws::WebSocketUpgrade, ConnectInfo, Json, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Build all routes for the gateway.
pub fn build_routes(state: GatewayState) -> Router {
    let cors = cors_layer(&state.config.gateway.cors_origins);

    Router::new()
        // WebSocket: firmware dials the root path
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        // Health
        .route("/health", get(health_handler))
        // Status & data
        .route("/api/status", get(status_handler))
        .route("/api/sensor", get(sensor_handler))
        .route("/api/history", get(history_handler))
        .route("/api/alerts", get(alerts_handler))
        .route("/api/clients", get(clients_handler))
        // Control
        .route("/api/control", post(control_handler))
        // Auth
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/me", get(me_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(parsed))
}

// ============================================================================
// WebSocket
// ============================================================================

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    debug!("WebSocket upgrade request from {}", addr);
    let max_payload = state.config.gateway.max_payload_bytes;
    ws.max_message_size(max_payload)
        .max_frame_size(max_payload)
        .on_upgrade(move |socket| websocket::handle_websocket(socket, state, addr))
}

// ============================================================================
// Health & Status
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime: u64,
    clients: usize,
    timestamp: DateTime<Utc>,
}

async fn health_handler(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime: state.uptime_secs(),
        clients: state.registry.len(),
        timestamp: Utc::now(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusStats {
    active_clients: usize,
    total_connections: u64,
    uptime: u64,
    analysis_count: u64,
    alert_count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    service: &'static str,
    status: &'static str,
    version: String,
    stats: StatusStats,
    latest_data: Option<SensorSnapshot>,
    endpoints: BTreeMap<&'static str, &'static str>,
}

async fn status_handler(State(state): State<GatewayState>) -> Json<StatusResponse> {
    let endpoints = BTreeMap::from([
        ("GET /health", "Health check"),
        ("GET /api/status", "Server info"),
        ("GET /api/sensor", "Latest sensor snapshot"),
        ("GET /api/history", "Buffered snapshots and statistics"),
        ("GET /api/alerts", "Recent threshold alerts"),
        ("GET /api/clients", "Open sessions"),
        ("POST /api/control", "Send a control command to all sessions"),
        ("POST /api/auth/login", "Obtain a bearer token"),
        ("GET /api/auth/me", "Current user"),
        ("WS /", "Device and dashboard socket"),
    ]);

    Json(StatusResponse {
        service: "CleanKiln Telemetry Gateway",
        status: "running",
        version: state.version.clone(),
        stats: StatusStats {
            active_clients: state.registry.len(),
            total_connections: state.registry.total_registered(),
            uptime: state.uptime_secs(),
            analysis_count: state.analysis.count(),
            alert_count: state.alerts.lock().total(),
        },
        latest_data: state.latest.read(),
        endpoints,
    })
}

// ============================================================================
// Sensor Data
// ============================================================================

#[derive(Debug, Serialize)]
struct SensorResponse {
    success: bool,
    data: Option<SensorSnapshot>,
    timestamp: DateTime<Utc>,
}

async fn sensor_handler(State(state): State<GatewayState>) -> Json<SensorResponse> {
    Json(SensorResponse {
        success: true,
        data: state.latest.read(),
        timestamp: Utc::now(),
    })
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    success: bool,
    count: usize,
    data: Vec<SensorSnapshot>,
    stats: BTreeMap<&'static str, SensorStats>,
}

async fn history_handler(State(state): State<GatewayState>) -> Json<HistoryResponse> {
    let data = state.latest.history();
    Json(HistoryResponse {
        success: true,
        count: data.len(),
        stats: state.latest.stats(),
        data,
    })
}

#[derive(Debug, Serialize)]
struct AlertsResponse {
    success: bool,
    count: usize,
    total: u64,
    data: Vec<AlertEvent>,
    thresholds: BTreeMap<String, Threshold>,
}

async fn alerts_handler(State(state): State<GatewayState>) -> Json<AlertsResponse> {
    let engine = state.alerts.lock();
    let data = engine.log();
    let thresholds = engine
        .thresholds()
        .iter()
        .map(|(k, t)| (k.to_string(), t.clone()))
        .collect();
    Json(AlertsResponse {
        success: true,
        count: data.len(),
        total: engine.total(),
        data,
        thresholds,
    })
}

async fn clients_handler(State(state): State<GatewayState>) -> Json<Vec<SessionInfo>> {
    Json(state.registry.all().iter().map(SessionInfo::from).collect())
}

// ============================================================================
// Control
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct ControlRequest {
    action: Option<String>,
    command: Option<String>,
}

impl ControlRequest {
    fn resolved(self) -> Option<String> {
        self.action
            .or(self.command)
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
    }
}

async fn control_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let source = if state.config.auth.require_for_control {
        match state.credentials.authorize(&headers) {
            Ok(claims) => claims.username,
            Err(e) => return e.into_response(),
        }
    } else {
        "api".to_string()
    };

    let request: ControlRequest = serde_json::from_slice(&body).unwrap_or_default();
    let Some(action) = request.resolved() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "message": "Missing action or command",
            })),
        )
            .into_response();
    };

    let sent_to = state.fanout.broadcast(&OutboundFrame::Control {
        action: action.clone(),
        source: source.clone(),
        timestamp: Utc::now(),
    });
    info!("Control '{}' from {} sent to {} client(s)", action, source, sent_to);

    Json(json!({
        "success": true,
        "message": "Command sent",
        "action": action,
        "sentTo": sent_to,
    }))
    .into_response()
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    success: bool,
    token: String,
    user: UserProfile,
}

async fn login_handler(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Result<Json<LoginResponse>, AuthError> {
    let request: LoginRequest = serde_json::from_slice(&body).unwrap_or_default();
    let credentials = state.credentials.clone();

    // bcrypt verification is CPU-bound.
    let (token, user) = tokio::task::spawn_blocking(move || {
        credentials.login(&request.username, &request.password)
    })
    .await??;

    info!("Login: {} ({})", user.username, user.role);
    Ok(Json(LoginResponse {
        success: true,
        token,
        user,
    }))
}

async fn me_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AuthError> {
    let claims = state.credentials.authorize(&headers)?;
    let user = state.credentials.profile(&claims.username).unwrap_or_else(|| UserProfile {
        id: claims.sub.parse().unwrap_or_default(),
        username: claims.username.clone(),
        role: claims.role.clone(),
    });
    Ok(Json(json!({ "success": true, "user": user })))
}
