//! Inbound frame codec and the normalizer that turns raw device readings into
//! a complete [`SensorSnapshot`].
//!
//! Device firmware revisions disagree on field names (`temp_bmp` vs
//! `temperature`, `eCO2` vs `eco2`, ...). All alias resolution lives in
//! [`normalize`]; nothing downstream looks at raw keys.

use super::snapshot::{HealthStatus, SensorSnapshot};

use chrono::Utc;
use serde_json::{Map, Value};

pub const TEMPERATURE_ALIASES: &[&str] = &["temperature", "temp_bmp", "temp"];
pub const ECO2_ALIASES: &[&str] = &["eco2", "eCO2"];
pub const PM10_ALIASES: &[&str] = &["pm10", "PM10"];
pub const PM25_ALIASES: &[&str] = &["pm25", "PM25", "pm2_5"];
pub const MOISTURE_ALIASES: &[&str] = &["moisture", "soil_moisture"];
pub const RELAY_ALIASES: &[&str] = &["relay_state", "relayState"];
pub const WIFI_ALIASES: &[&str] = &["wifi_status", "wifiStatus"];
pub const ML_MODE_ALIASES: &[&str] = &["ml_mode", "mlMode"];

pub const UNKNOWN_RELAY_STATE: &str = "UNKNOWN";
pub const UNKNOWN_WIFI_STATUS: &str = "Unknown";
pub const UNKNOWN_DEVICE: &str = "unknown";
pub const SOURCE_SENSOR: &str = "Sensor";
pub const SOURCE_ML: &str = "ML_Prediction";

/// Sea-level reference pressure in hPa.
pub const SEA_LEVEL_HPA: f64 = 1013.25;

/// Why an inbound payload could not be turned into a [`Frame`].
///
/// None of these are fatal to the connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("empty frame")]
    Empty,
    #[error("payload is not JSON: {0}")]
    NotJson(String),
    #[error("JSON payload is not an object")]
    NotObject,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Literal `ping`/`pong` text.
    Keepalive,
    /// Device announces its identity.
    Init { device: Option<String> },
    /// Raw telemetry, still carrying firmware-specific field names.
    SensorData(Map<String, Value>),
    /// Actuator state echo.
    RelayStatus {
        state: String,
        timestamp: Option<Value>,
    },
    /// Structured frame with an unrecognized or missing `type`.
    Unknown { kind: Option<String> },
}

/// Dispatch key of a [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Keepalive,
    Init,
    SensorData,
    RelayStatus,
    Unknown,
}

impl FrameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Keepalive => "keepalive",
            FrameKind::Init => "init",
            FrameKind::SensorData => "sensor_data",
            FrameKind::RelayStatus => "relay_status",
            FrameKind::Unknown => "unknown",
        }
    }
}

/// Decode one inbound text (or UTF-8 binary) payload.
pub fn decode(raw: &[u8]) -> Result<Frame, DecodeError> {
    let text = std::str::from_utf8(raw).map_err(|e| DecodeError::NotJson(e.to_string()))?;
    let text = text.trim();

    if text.is_empty() {
        return Err(DecodeError::Empty);
    }

    if text.eq_ignore_ascii_case("ping") || text.eq_ignore_ascii_case("pong") {
        return Ok(Frame::Keepalive);
    }

    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::NotJson(e.to_string()))?;
    let Value::Object(object) = value else {
        return Err(DecodeError::NotObject);
    };

    let kind = object.get("type").and_then(Value::as_str).map(str::to_owned);
    let frame = match kind.as_deref() {
        Some("init") => Frame::Init {
            device: text_field(&object, &["device"]),
        },
        Some("sensor_data") => Frame::SensorData(object),
        Some("relay_status") => Frame::RelayStatus {
            state: text_field(&object, &["state"])
                .unwrap_or_else(|| UNKNOWN_RELAY_STATE.to_string()),
            timestamp: object.get("timestamp").cloned(),
        },
        _ => Frame::Unknown { kind },
    };

    Ok(frame)
}

/// Dispatch key for a decoded frame.
pub fn classify(frame: &Frame) -> FrameKind {
    match frame {
        Frame::Keepalive => FrameKind::Keepalive,
        Frame::Init { .. } => FrameKind::Init,
        Frame::SensorData(_) => FrameKind::SensorData,
        Frame::RelayStatus { .. } => FrameKind::RelayStatus,
        Frame::Unknown { .. } => FrameKind::Unknown,
    }
}

/// Build a complete snapshot from a raw `sensor_data` object.
///
/// Absent numeric fields become `0`. The origin session is left at `0`; use
/// [`SensorSnapshot::with_origin`] to attribute it.
pub fn normalize(raw: &Map<String, Value>) -> SensorSnapshot {
    let pressure = number(raw, &["pressure"]);
    let altitude = match number(raw, &["altitude"]) {
        explicit if explicit != 0.0 => explicit,
        _ => derive_altitude(pressure),
    };

    let pm25 = number(raw, PM25_ALIASES);
    let voc = number(raw, &["voc"]);
    let ml_mode = flag(raw, ML_MODE_ALIASES);

    let source = text_field(raw, &["source"]).unwrap_or_else(|| {
        if ml_mode {
            SOURCE_ML.to_string()
        } else {
            SOURCE_SENSOR.to_string()
        }
    });

    SensorSnapshot {
        pm25,
        pm10: number(raw, PM10_ALIASES),
        voc,
        eco2: number(raw, ECO2_ALIASES),
        h2: number(raw, &["h2"]),
        ethanol: number(raw, &["ethanol"]),
        temperature: number(raw, TEMPERATURE_ALIASES),
        humidity: number(raw, &["humidity"]),
        pressure,
        altitude,
        moisture: number(raw, MOISTURE_ALIASES),
        raw: number(raw, &["raw"]),
        heap: number(raw, &["heap"]),
        rssi: number(raw, &["rssi"]),
        relay_state: text_field(raw, RELAY_ALIASES)
            .unwrap_or_else(|| UNKNOWN_RELAY_STATE.to_string()),
        wifi_status: text_field(raw, WIFI_ALIASES)
            .unwrap_or_else(|| UNKNOWN_WIFI_STATUS.to_string()),
        source,
        status: HealthStatus::classify(pm25, voc),
        device: text_field(raw, &["device"]).unwrap_or_else(|| UNKNOWN_DEVICE.to_string()),
        ml_mode,
        timestamp: Utc::now(),
        client_id: 0,
    }
}

/// Barometric altitude in metres for a pressure in hPa; `0` when pressure is
/// not positive.
pub fn derive_altitude(pressure_hpa: f64) -> f64 {
    if pressure_hpa > 0.0 {
        44330.0 * (1.0 - (pressure_hpa / SEA_LEVEL_HPA).powf(0.1903))
    } else {
        0.0
    }
}

/// Whether the raw frame carried a numeric reading under any of `aliases`.
pub fn reports(raw: &Map<String, Value>, aliases: &[&str]) -> bool {
    aliases
        .iter()
        .any(|key| raw.get(*key).and_then(as_number).is_some())
}

/// First alias holding a non-zero finite number, else `0`.
fn number(raw: &Map<String, Value>, aliases: &[&str]) -> f64 {
    aliases
        .iter()
        .filter_map(|key| raw.get(*key).and_then(as_number))
        .find(|v| *v != 0.0)
        .unwrap_or(0.0)
}

fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn text_field(raw: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|key| match raw.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn flag(raw: &Map<String, Value>, aliases: &[&str]) -> bool {
    aliases.iter().any(|key| match raw.get(*key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        _ => false,
    })
}
