//! Threshold alerts and health status.
//!
//! Each monitored sensor key has its own cooldown clock: once a key alerts,
//! it stays silent until the cooldown has elapsed, whatever the tier.

use super::snapshot::{HealthStatus, SensorSnapshot};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// Boundaries and display metadata for one sensor key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Threshold {
    pub good: f64,
    pub warning: f64,
    pub danger: f64,
    pub unit: String,
    pub label: String,
}

impl Threshold {
    fn new(good: f64, warning: f64, danger: f64, unit: &str, label: &str) -> Self {
        Self {
            good,
            warning,
            danger,
            unit: unit.to_string(),
            label: label.to_string(),
        }
    }
}

/// Static sensor key → threshold table, fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    entries: Vec<(String, Threshold)>,
}

impl Thresholds {
    pub fn new(entries: Vec<(String, Threshold)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&Threshold> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, t)| t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Threshold)> {
        self.entries.iter().map(|(k, t)| (k.as_str(), t))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::new(vec![
            ("pm25".into(), Threshold::new(12.0, 35.0, 55.0, "µg/m³", "PM2.5")),
            ("pm10".into(), Threshold::new(50.0, 50.0, 150.0, "µg/m³", "PM10")),
            ("voc".into(), Threshold::new(100.0, 200.0, 500.0, "ppb", "VOC")),
            ("temperature".into(), Threshold::new(28.0, 35.0, 40.0, "°C", "Temperature")),
            ("humidity".into(), Threshold::new(60.0, 80.0, 90.0, "%", "Humidity")),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Danger,
}

/// A single threshold crossing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: u64,
    pub sensor: String,
    pub label: String,
    pub value: f64,
    pub threshold: f64,
    pub level: AlertLevel,
    pub unit: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Alert & status engine with per-key cooldown and a bounded, newest-first log.
pub struct AlertEngine {
    thresholds: Thresholds,
    cooldown: Duration,
    capacity: usize,
    last_alert: HashMap<String, Instant>,
    log: VecDeque<AlertEvent>,
    next_id: u64,
}

impl AlertEngine {
    pub fn new(thresholds: Thresholds, cooldown: Duration, capacity: usize) -> Self {
        Self {
            thresholds,
            cooldown,
            capacity,
            last_alert: HashMap::new(),
            log: VecDeque::with_capacity(capacity),
            next_id: 1,
        }
    }

    pub fn evaluate(&mut self, snapshot: &SensorSnapshot) -> (HealthStatus, Vec<AlertEvent>) {
        self.evaluate_at(snapshot, Instant::now())
    }

    pub fn evaluate_at(
        &mut self,
        snapshot: &SensorSnapshot,
        now: Instant,
    ) -> (HealthStatus, Vec<AlertEvent>) {
        let status = HealthStatus::classify(snapshot.pm25, snapshot.voc);
        let mut events = Vec::new();

        for (key, threshold) in self.thresholds.iter() {
            let value = match snapshot.reading(key) {
                Some(v) if v != 0.0 && v.is_finite() => v,
                _ => continue,
            };

            if let Some(last) = self.last_alert.get(key) {
                if now.saturating_duration_since(*last) < self.cooldown {
                    continue;
                }
            }

            let (level, limit, kind) = if value >= threshold.danger {
                (AlertLevel::Danger, threshold.danger, "danger")
            } else if value >= threshold.warning {
                (AlertLevel::Warning, threshold.warning, "warning")
            } else {
                continue;
            };

            let event = AlertEvent {
                id: self.next_id,
                sensor: key.to_string(),
                label: threshold.label.clone(),
                value,
                threshold: limit,
                level,
                unit: threshold.unit.clone(),
                message: format!(
                    "{} at {}{} exceeds {} limit ({}{})",
                    threshold.label, value, threshold.unit, kind, limit, threshold.unit
                ),
                timestamp: Utc::now(),
            };
            self.next_id += 1;
            self.last_alert.insert(key.to_string(), now);
            events.push(event);
        }

        // Newest first: later events in this batch go in front.
        for event in &events {
            self.log.push_front(event.clone());
        }
        self.log.truncate(self.capacity);

        (status, events)
    }

    /// Retained alerts, newest first.
    pub fn log(&self) -> Vec<AlertEvent> {
        self.log.iter().cloned().collect()
    }

    /// Alerts emitted since startup, including ones aged out of the log.
    pub fn total(&self) -> u64 {
        self.next_id - 1
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::codec::normalize;
    use serde_json::json;

    fn engine() -> AlertEngine {
        AlertEngine::new(Thresholds::default(), Duration::from_secs(30), 50)
    }

    fn snapshot(fields: serde_json::Value) -> SensorSnapshot {
        normalize(fields.as_object().unwrap())
    }

    #[test]
    fn pm25_danger_raises_single_alert() {
        let mut engine = engine();
        let (status, alerts) = engine.evaluate(&snapshot(json!({ "pm25": 60, "voc": 0 })));

        assert_eq!(status, HealthStatus::Danger);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].sensor, "pm25");
        assert_eq!(alerts[0].level, AlertLevel::Danger);
        assert_eq!(alerts[0].threshold, 55.0);
        assert_eq!(alerts[0].value, 60.0);
    }

    #[test]
    fn cooldown_suppresses_repeat_within_window() {
        let mut engine = engine();
        let reading = snapshot(json!({ "pm25": 60 }));
        let start = Instant::now();

        let (_, first) = engine.evaluate_at(&reading, start);
        let (_, second) = engine.evaluate_at(&reading, start + Duration::from_secs(29));
        let (_, third) = engine.evaluate_at(&reading, start + Duration::from_secs(30));

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(third.len(), 1);
        assert_eq!(engine.log().len(), 2);
    }

    #[test]
    fn cooldown_is_per_sensor_key() {
        let mut engine = engine();
        let start = Instant::now();
        engine.evaluate_at(&snapshot(json!({ "pm25": 60 })), start);
        let (_, alerts) = engine.evaluate_at(
            &snapshot(json!({ "pm25": 60, "voc": 250 })),
            start + Duration::from_secs(1),
        );

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].sensor, "voc");
        assert_eq!(alerts[0].level, AlertLevel::Warning);
    }

    #[test]
    fn zero_readings_are_skipped() {
        let mut engine = engine();
        let (status, alerts) = engine.evaluate(&snapshot(json!({})));
        assert_eq!(status, HealthStatus::Healthy);
        assert!(alerts.is_empty());
    }

    #[test]
    fn values_below_warning_do_not_start_cooldown() {
        let mut engine = engine();
        let start = Instant::now();
        engine.evaluate_at(&snapshot(json!({ "humidity": 50 })), start);
        let (_, alerts) =
            engine.evaluate_at(&snapshot(json!({ "humidity": 85 })), start + Duration::from_secs(1));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, AlertLevel::Warning);
    }

    #[test]
    fn log_keeps_newest_fifty() {
        let mut engine = engine();
        let start = Instant::now();
        for i in 0..60u64 {
            engine.evaluate_at(
                &snapshot(json!({ "pm25": 60 + i })),
                start + Duration::from_secs(31 * i),
            );
        }
        let log = engine.log();
        assert_eq!(log.len(), 50);
        assert_eq!(log[0].value, 119.0);
        assert!(log[0].id > log[1].id);
    }
}
