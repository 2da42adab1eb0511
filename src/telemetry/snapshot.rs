use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// PM2.5 (µg/m³) above which air is considered unhealthy.
pub const PM25_DANGER: f64 = 55.0;
/// PM2.5 (µg/m³) above which air is considered moderate.
pub const PM25_MODERATE: f64 = 35.0;
/// VOC index above which air is considered unhealthy.
pub const VOC_DANGER: f64 = 500.0;
/// VOC index above which air is considered moderate.
pub const VOC_MODERATE: f64 = 200.0;

/// Coarse air-quality health derived from particulate and VOC readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Healthy,
    Moderate,
    Danger,
}

impl HealthStatus {
    /// Worst tier breached by either PM2.5 or VOC. Bounds are exclusive.
    pub fn classify(pm25: f64, voc: f64) -> Self {
        if pm25 > PM25_DANGER || voc > VOC_DANGER {
            HealthStatus::Danger
        } else if pm25 > PM25_MODERATE || voc > VOC_MODERATE {
            HealthStatus::Moderate
        } else {
            HealthStatus::Healthy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Moderate => "moderate",
            HealthStatus::Danger => "danger",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The normalized view of the most recent device reading.
///
/// Every field is always populated: numbers default to `0`, textual fields to
/// a sentinel. Downstream consumers never branch on missing keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub pm25: f64,
    pub pm10: f64,
    pub voc: f64,
    pub eco2: f64,
    pub h2: f64,
    pub ethanol: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub altitude: f64,
    pub moisture: f64,
    /// Raw moisture ADC count as reported by the probe.
    pub raw: f64,
    pub heap: f64,
    pub rssi: f64,
    pub relay_state: String,
    pub wifi_status: String,
    pub source: String,
    pub status: HealthStatus,
    pub device: String,
    /// Reading came from the on-device predictive model, not a physical sensor.
    pub ml_mode: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "clientId")]
    pub client_id: u64,
}

impl SensorSnapshot {
    /// Numeric reading for a monitored sensor key, if the key is known.
    pub fn reading(&self, key: &str) -> Option<f64> {
        let value = match key {
            "pm25" => self.pm25,
            "pm10" => self.pm10,
            "voc" => self.voc,
            "eco2" => self.eco2,
            "h2" => self.h2,
            "ethanol" => self.ethanol,
            "temperature" => self.temperature,
            "humidity" => self.humidity,
            "pressure" => self.pressure,
            "altitude" => self.altitude,
            "moisture" => self.moisture,
            "raw" => self.raw,
            "heap" => self.heap,
            "rssi" => self.rssi,
            _ => return None,
        };
        Some(value)
    }

    /// Attribute the snapshot to the session it arrived on.
    pub fn with_origin(mut self, client_id: u64) -> Self {
        self.client_id = client_id;
        self
    }
}

/// The snapshot of a frame that reported nothing: zeros and sentinels.
impl Default for SensorSnapshot {
    fn default() -> Self {
        super::codec::normalize(&serde_json::Map::new())
    }
}
