use crate::telemetry::{AlertEvent, ControlCommand, SensorSnapshot};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Sentence broadcast when the summarization call fails.
pub const ANALYSIS_FALLBACK_TEXT: &str = "AI analysis system temporarily offline. All sensors are actively monitored and data is being recorded. System operations continue normally.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatusKind {
    Online,
    Offline,
}

/// Every frame the gateway writes to a socket: `{type: ..., ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Welcome {
        message: String,
        #[serde(rename = "clientId")]
        client_id: u64,
        timestamp: DateTime<Utc>,
    },
    InitAck {
        message: String,
        #[serde(rename = "clientId")]
        client_id: u64,
    },
    /// Receipt for a payload that was not a JSON object.
    Ack {
        message: String,
        timestamp: DateTime<Utc>,
    },
    SensorAck {
        moisture: f64,
        timestamp: DateTime<Utc>,
    },
    SensorData(SensorSnapshot),
    DeviceStatus {
        device: String,
        status: DeviceStatusKind,
        #[serde(rename = "clientId")]
        client_id: u64,
        timestamp: DateTime<Utc>,
    },
    AutoControl(ControlCommand),
    StatusPompa {
        status: String,
        moisture: f64,
    },
    RelayUpdate {
        state: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<serde_json::Value>,
        #[serde(rename = "clientId")]
        client_id: u64,
    },
    Alert(AlertEvent),
    AiResponse {
        text: String,
        timestamp: DateTime<Utc>,
        #[serde(rename = "analysisCount", skip_serializing_if = "Option::is_none")]
        analysis_count: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<bool>,
    },
    Control {
        action: String,
        source: String,
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
    },
}

impl OutboundFrame {
    pub fn welcome(client_id: u64) -> Self {
        OutboundFrame::Welcome {
            message: "Connected to CleanKiln telemetry gateway".to_string(),
            client_id,
            timestamp: Utc::now(),
        }
    }

    pub fn device_status(device: &str, status: DeviceStatusKind, client_id: u64) -> Self {
        OutboundFrame::DeviceStatus {
            device: device.to_string(),
            status,
            client_id,
            timestamp: Utc::now(),
        }
    }

    pub fn analysis(text: String, analysis_count: u64) -> Self {
        OutboundFrame::AiResponse {
            text,
            timestamp: Utc::now(),
            analysis_count: Some(analysis_count),
            error: None,
        }
    }

    pub fn analysis_fallback() -> Self {
        OutboundFrame::AiResponse {
            text: ANALYSIS_FALLBACK_TEXT.to_string(),
            timestamp: Utc::now(),
            analysis_count: None,
            error: Some(true),
        }
    }

    /// Wire discriminator, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundFrame::Welcome { .. } => "welcome",
            OutboundFrame::InitAck { .. } => "init_ack",
            OutboundFrame::Ack { .. } => "ack",
            OutboundFrame::SensorAck { .. } => "sensor_ack",
            OutboundFrame::SensorData(_) => "sensor_data",
            OutboundFrame::DeviceStatus { .. } => "device_status",
            OutboundFrame::AutoControl(_) => "auto_control",
            OutboundFrame::StatusPompa { .. } => "status_pompa",
            OutboundFrame::RelayUpdate { .. } => "relay_update",
            OutboundFrame::Alert(_) => "alert",
            OutboundFrame::AiResponse { .. } => "ai_response",
            OutboundFrame::Control { .. } => "control",
            OutboundFrame::Error { .. } => "error",
        }
    }
}
