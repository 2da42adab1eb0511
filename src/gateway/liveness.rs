//! Periodic heartbeat sweep over every registered session.
//!
//! Each tick a session that never answered the previous probe, or whose
//! last pong is older than the stale window, is terminated. Everyone else
//! gets the alive flag cleared and a fresh ping.

use crate::gateway::fanout::Broadcaster;
use crate::gateway::registry::{Outbound, SessionRegistry};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Close code sent to sessions dropped for missing heartbeats.
pub const CLOSE_UNRESPONSIVE: u16 = 1001;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub terminated: usize,
}

pub struct LivenessSupervisor {
    registry: Arc<SessionRegistry>,
    fanout: Broadcaster,
    period: Duration,
    stale_after: Duration,
}

impl LivenessSupervisor {
    pub fn new(
        registry: Arc<SessionRegistry>,
        fanout: Broadcaster,
        period: Duration,
        stale_after: Duration,
    ) -> Self {
        Self {
            registry,
            fanout,
            period,
            stale_after,
        }
    }

    /// Run the sweep every `period` until `shutdown` fires.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                "Liveness supervisor started (every {}s, stale after {}s)",
                self.period.as_secs(),
                self.stale_after.as_secs()
            );

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = self.sweep();
                        if report.terminated > 0 {
                            info!(
                                "Liveness sweep: {} probed, {} terminated",
                                report.probed, report.terminated
                            );
                        }
                    }
                }
            }
            debug!("Liveness supervisor stopped");
        })
    }

    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Instant::now())
    }

    /// One pass over a snapshot of the registry.
    pub fn sweep_at(&self, now: Instant) -> SweepReport {
        let mut report = SweepReport::default();

        for session in self.registry.all() {
            let silent_for = now.saturating_duration_since(session.last_pong);
            let reason = if !session.alive {
                Some("no heartbeat response")
            } else if silent_for > self.stale_after {
                Some("heartbeat stale")
            } else {
                None
            };

            if let Some(reason) = reason {
                self.terminate(session.id, reason);
                report.terminated += 1;
                continue;
            }

            self.registry.clear_alive(session.id);
            match session.try_send(Outbound::Ping) {
                Ok(()) => report.probed += 1,
                Err(TrySendError::Full(_)) => {
                    // Probe lost; the next sweep sees alive=false and drops it.
                    debug!("Ping queue full for client #{}", session.id);
                    report.probed += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    self.terminate(session.id, "transport closed");
                    report.terminated += 1;
                }
            }
        }

        report
    }

    fn terminate(&self, id: u64, reason: &str) {
        let Some(session) = self.registry.deregister(id) else {
            return;
        };
        warn!(
            "Terminating client #{} ({}): {}",
            id,
            session.display_name(),
            reason
        );
        session.terminate(CLOSE_UNRESPONSIVE, reason);
        self.fanout.announce_offline(&session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::registry::SessionRole;
    use tokio::sync::mpsc;

    fn supervisor(registry: &Arc<SessionRegistry>) -> LivenessSupervisor {
        LivenessSupervisor::new(
            registry.clone(),
            Broadcaster::new(registry.clone()),
            Duration::from_secs(30),
            Duration::from_secs(60),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn unresponsive_session_is_dropped_others_untouched() {
        let registry = Arc::new(SessionRegistry::new());
        let sup = supervisor(&registry);

        let (tx_quiet, mut rx_quiet) = mpsc::channel(8);
        let (tx_chatty, mut rx_chatty) = mpsc::channel(8);
        let quiet = registry.register(tx_quiet);
        let chatty = registry.register(tx_chatty);

        let first = sup.sweep();
        assert_eq!(first, SweepReport { probed: 2, terminated: 0 });
        assert_eq!(rx_quiet.try_recv(), Ok(Outbound::Ping));
        assert_eq!(rx_chatty.try_recv(), Ok(Outbound::Ping));

        tokio::time::advance(Duration::from_secs(30)).await;
        registry.mark_alive(chatty.id);

        let second = sup.sweep();
        assert_eq!(second, SweepReport { probed: 1, terminated: 1 });
        assert!(registry.get(quiet.id).is_none());
        assert!(registry.get(chatty.id).is_some());
        assert!(matches!(rx_quiet.try_recv(), Ok(Outbound::Close { code: 1001, .. })));
        assert!(quiet.cancel_token().is_cancelled());
        assert_eq!(rx_chatty.try_recv(), Ok(Outbound::Ping));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_pong_is_dropped_even_when_flag_set() {
        let registry = Arc::new(SessionRegistry::new());
        let sup = supervisor(&registry);

        let (tx, _rx) = mpsc::channel(8);
        let session = registry.register(tx);

        let later = Instant::now() + Duration::from_secs(61);
        let report = sup.sweep_at(later);

        assert_eq!(report.terminated, 1);
        assert!(registry.get(session.id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_device_is_announced_offline() {
        let registry = Arc::new(SessionRegistry::new());
        let sup = supervisor(&registry);

        let (tx_viewer, mut rx_viewer) = mpsc::channel(8);
        let viewer = registry.register(tx_viewer);
        let (tx_dev, _rx_dev) = mpsc::channel(8);
        let device = registry.register(tx_dev);
        registry.infer_role(device.id, SessionRole::Device);
        registry.clear_alive(device.id);

        sup.sweep();
        registry.mark_alive(viewer.id);

        let mut saw_offline = false;
        while let Ok(item) = rx_viewer.try_recv() {
            if let Outbound::Text(json) = item {
                let value: serde_json::Value = serde_json::from_str(&json).unwrap();
                saw_offline |= value["type"] == "device_status" && value["status"] == "offline";
            }
        }
        assert!(saw_offline);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_loop_probes_on_period() {
        let registry = Arc::new(SessionRegistry::new());
        let (tx, mut rx) = mpsc::channel(8);
        registry.register(tx);

        let shutdown = CancellationToken::new();
        let handle = supervisor(&registry).spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(rx.try_recv(), Ok(Outbound::Ping));

        shutdown.cancel();
        handle.await.unwrap();
    }
}
