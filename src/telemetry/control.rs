//! Pump relay control from the soil-moisture reading.
//!
//! Plain on/off thresholding with no hysteresis band: a reading hovering at
//! the boundary flips the command with measurement noise.

use serde::{Deserialize, Serialize};

/// Moisture percentage below which the pump is switched on.
pub const MOISTURE_ON_BELOW: f64 = 30.0;

pub const REASON_LOW: &str = "low moisture";
pub const REASON_SUFFICIENT: &str = "sufficient moisture";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PumpAction {
    On,
    Off,
}

impl PumpAction {
    /// Human-readable pump state shown on dashboards.
    pub fn pump_status(&self) -> &'static str {
        match self {
            PumpAction::On => "WATERING",
            PumpAction::Off => "STANDBY",
        }
    }
}

/// Command sent back to the device that produced the reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlCommand {
    pub action: PumpAction,
    pub reason: String,
    pub moisture: f64,
}

/// `ON` below 30 %, `OFF` at or above it.
pub fn decide(moisture: f64) -> ControlCommand {
    if moisture < MOISTURE_ON_BELOW {
        ControlCommand {
            action: PumpAction::On,
            reason: REASON_LOW.to_string(),
            moisture,
        }
    } else {
        ControlCommand {
            action: PumpAction::Off,
            reason: REASON_SUFFICIENT.to_string(),
            moisture,
        }
    }
}
