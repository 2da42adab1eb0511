use super::snapshot::SensorSnapshot;

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

/// Sensor keys summarized by [`LatestState::stats`].
pub const STAT_KEYS: &[&str] = &[
    "pm25",
    "pm10",
    "voc",
    "eco2",
    "temperature",
    "humidity",
    "pressure",
    "altitude",
    "moisture",
];

/// Min / max / average over positive readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct SensorStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

impl SensorStats {
    /// Statistics over the positive finite values, rounded to one decimal.
    /// All-zero when no value qualifies.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let filtered: Vec<f64> = values
            .into_iter()
            .filter(|v| v.is_finite() && *v > 0.0)
            .collect();
        if filtered.is_empty() {
            return Self::default();
        }

        let min = filtered.iter().copied().fold(f64::INFINITY, f64::min);
        let max = filtered.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = filtered.iter().sum::<f64>() / filtered.len() as f64;

        Self {
            min: round1(min),
            max: round1(max),
            avg: round1(avg),
        }
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Latest-state cache: the single most recent snapshot plus a bounded history.
///
/// Writers replace the snapshot wholesale; readers clone it out and never
/// hold the lock across anything else.
pub struct LatestState {
    current: RwLock<Option<SensorSnapshot>>,
    history: RwLock<VecDeque<SensorSnapshot>>,
    capacity: usize,
}

impl LatestState {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            current: RwLock::new(None),
            history: RwLock::new(VecDeque::with_capacity(history_capacity)),
            capacity: history_capacity,
        }
    }

    /// Replace the cached snapshot and append it to the history ring.
    pub fn publish(&self, snapshot: SensorSnapshot) {
        {
            let mut history = self.history.write();
            if self.capacity > 0 {
                while history.len() >= self.capacity {
                    history.pop_front();
                }
                history.push_back(snapshot.clone());
            }
        }
        *self.current.write() = Some(snapshot);
    }

    /// Current snapshot, or `None` before any data has arrived.
    pub fn read(&self) -> Option<SensorSnapshot> {
        self.current.read().clone()
    }

    /// Buffered snapshots, oldest first.
    pub fn history(&self) -> Vec<SensorSnapshot> {
        self.history.read().iter().cloned().collect()
    }

    /// Per-sensor statistics over the buffered history.
    pub fn stats(&self) -> BTreeMap<&'static str, SensorStats> {
        let history = self.history.read();
        STAT_KEYS
            .iter()
            .map(|key| {
                let values = history.iter().filter_map(|s| s.reading(key));
                (*key, SensorStats::from_values(values))
            })
            .collect()
    }
}
