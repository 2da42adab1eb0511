pub mod alerts;
pub mod cache;
pub mod codec;
pub mod control;
mod snapshot;

pub use alerts::{AlertEngine, AlertEvent, AlertLevel, Threshold, Thresholds};
pub use cache::{LatestState, SensorStats};
pub use codec::{classify, decode, normalize, DecodeError, Frame, FrameKind};
pub use control::{decide, ControlCommand, PumpAction};
pub use snapshot::*;
