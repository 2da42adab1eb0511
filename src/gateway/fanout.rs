use crate::gateway::protocol::{DeviceStatusKind, OutboundFrame};
use crate::gateway::registry::{Outbound, Session, SessionRegistry};

use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, warn};

/// Best-effort, at-most-once delivery to every open session.
///
/// Never queues beyond each session's own writer channel and never blocks:
/// a saturated recipient loses that frame.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<SessionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Serialize once and queue to every open session. Returns how many
    /// sessions accepted the frame.
    pub fn broadcast(&self, frame: &OutboundFrame) -> usize {
        let json = match serde_json::to_string(frame) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize {} frame: {}", frame.kind(), e);
                return 0;
            }
        };

        let mut sent = 0;
        for session in self.registry.all() {
            if !session.is_open() {
                continue;
            }
            match session.try_send(Outbound::Text(json.clone())) {
                Ok(()) => sent += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "Dropping {} frame for client #{}: outbound queue full",
                        frame.kind(),
                        session.id
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(
                        "Skipping {} frame for client #{}: transport closed",
                        frame.kind(),
                        session.id
                    );
                }
            }
        }

        if sent > 0 {
            debug!("Broadcast {} to {} client(s)", frame.kind(), sent);
        }
        sent
    }

    /// Queue a frame to a single session, e.g. the device that sent a reading.
    pub fn send_to(&self, session: &Session, frame: &OutboundFrame) -> bool {
        let json = match serde_json::to_string(frame) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize {} frame: {}", frame.kind(), e);
                return false;
            }
        };
        match session.try_send(Outbound::Text(json)) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Failed to send {} to client #{}: {}",
                    frame.kind(),
                    session.id,
                    e
                );
                false
            }
        }
    }

    /// Tell the remaining sessions that `session` went away, whatever its
    /// role. Dashboards filter on `clientId`.
    pub fn announce_offline(&self, session: &Session) -> usize {
        self.broadcast(&OutboundFrame::device_status(
            session.display_name(),
            DeviceStatusKind::Offline,
            session.id,
        ))
    }
}
