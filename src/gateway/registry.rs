use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// What a session turned out to be, inferred from its first structured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    Device,
    Viewer,
    #[default]
    Unknown,
}

/// Item queued to a session's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Ping,
    Close { code: u16, reason: String },
}

/// One open connection and its liveness metadata.
///
/// Cloning yields a snapshot of the metadata plus a handle to the same
/// transport.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: u64,
    pub role: SessionRole,
    pub alive: bool,
    pub last_pong: Instant,
    pub connected_at: Instant,
    pub connected_at_utc: chrono::DateTime<chrono::Utc>,
    pub device_name: Option<String>,
    tx: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
}

impl Session {
    /// Whether the writer side of the transport can still accept frames.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed() && !self.cancel.is_cancelled()
    }

    /// Queue a frame without waiting. A full queue drops the frame.
    pub fn try_send(
        &self,
        item: Outbound,
    ) -> Result<(), mpsc::error::TrySendError<Outbound>> {
        self.tx.try_send(item)
    }

    /// Token cancelled when the session is torn down.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel the connection tasks and ask the writer to send a close frame.
    pub fn terminate(&self, code: u16, reason: &str) {
        let _ = self.tx.try_send(Outbound::Close {
            code,
            reason: reason.to_string(),
        });
        self.cancel.cancel();
    }

    /// Announced device name, or the firmware default.
    pub fn display_name(&self) -> &str {
        self.device_name.as_deref().unwrap_or(DEFAULT_DEVICE_NAME)
    }
}

/// Name used for devices that never announced themselves.
pub const DEFAULT_DEVICE_NAME: &str = "ESP32-S3";

/// Serializable view of a session for the REST surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub client_id: u64,
    pub role: SessionRole,
    pub alive: bool,
    pub device: Option<String>,
    pub connected_at: chrono::DateTime<chrono::Utc>,
    pub connected_secs: u64,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            client_id: session.id,
            role: session.role,
            alive: session.alive,
            device: session.device_name.clone(),
            connected_at: session.connected_at_utc,
            connected_secs: session.connected_at.elapsed().as_secs(),
        }
    }
}

/// Tracks every open connection. Identifiers come from a monotonic counter
/// and are never reused for the lifetime of the registry.
pub struct SessionRegistry {
    sessions: DashMap<u64, Session>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create and store a session writing to `tx`.
    pub fn register(&self, tx: mpsc::Sender<Outbound>) -> Session {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Instant::now();
        let session = Session {
            id,
            role: SessionRole::Unknown,
            alive: true,
            last_pong: now,
            connected_at: now,
            connected_at_utc: chrono::Utc::now(),
            device_name: None,
            tx,
            cancel: CancellationToken::new(),
        };
        self.sessions.insert(id, session.clone());
        session
    }

    /// Record a liveness response.
    pub fn mark_alive(&self, id: u64) -> bool {
        match self.sessions.get_mut(&id) {
            Some(mut session) => {
                session.alive = true;
                session.last_pong = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Clear the liveness flag ahead of a probe.
    pub fn clear_alive(&self, id: u64) -> bool {
        match self.sessions.get_mut(&id) {
            Some(mut session) => {
                session.alive = false;
                true
            }
            None => false,
        }
    }

    /// Set the role if it is still unknown. Returns the effective role.
    pub fn infer_role(&self, id: u64, role: SessionRole) -> Option<SessionRole> {
        let mut session = self.sessions.get_mut(&id)?;
        if session.role == SessionRole::Unknown {
            session.role = role;
        }
        Some(session.role)
    }

    pub fn set_device_name(&self, id: u64, name: &str) -> bool {
        match self.sessions.get_mut(&id) {
            Some(mut session) => {
                session.device_name = Some(name.to_string());
                true
            }
            None => false,
        }
    }

    /// Remove a session. `None` if it was already gone, so teardown paths
    /// racing each other announce the departure only once.
    pub fn deregister(&self, id: u64) -> Option<Session> {
        self.sessions.remove(&id).map(|(_, session)| session)
    }

    pub fn get(&self, id: u64) -> Option<Session> {
        self.sessions.get(&id).map(|s| s.clone())
    }

    /// Point-in-time copy of every registered session, ordered by id.
    pub fn all(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.iter().map(|s| s.clone()).collect();
        sessions.sort_by_key(|s| s.id);
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Connections accepted since the registry was created.
    pub fn total_registered(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst) - 1
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (mpsc::Sender<Outbound>, mpsc::Receiver<Outbound>) {
        mpsc::channel(8)
    }

    #[tokio::test]
    async fn ids_are_unique_and_never_reused() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = channel();
        let a = registry.register(tx.clone());
        let b = registry.register(tx.clone());
        registry.deregister(a.id);
        let c = registry.register(tx);

        assert_ne!(a.id, b.id);
        assert!(c.id > b.id);
        assert_eq!(registry.total_registered(), 3);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn deregister_returns_device_name_once() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = channel();
        let session = registry.register(tx);
        registry.set_device_name(session.id, "kiln-probe");

        let removed = registry.deregister(session.id).unwrap();
        assert_eq!(removed.display_name(), "kiln-probe");
        assert!(registry.deregister(session.id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn mark_alive_resets_flag_and_timestamp() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = channel();
        let session = registry.register(tx);

        registry.clear_alive(session.id);
        assert!(!registry.get(session.id).unwrap().alive);

        tokio::time::advance(std::time::Duration::from_secs(5)).await;
        assert!(registry.mark_alive(session.id));
        let refreshed = registry.get(session.id).unwrap();
        assert!(refreshed.alive);
        assert!(refreshed.last_pong > session.last_pong);
    }

    #[tokio::test]
    async fn role_is_fixed_by_first_inference() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = channel();
        let session = registry.register(tx);

        assert_eq!(
            registry.infer_role(session.id, SessionRole::Device),
            Some(SessionRole::Device)
        );
        assert_eq!(
            registry.infer_role(session.id, SessionRole::Viewer),
            Some(SessionRole::Device)
        );
    }

    #[tokio::test]
    async fn all_is_a_stable_snapshot() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = channel();
        for _ in 0..3 {
            registry.register(tx.clone());
        }

        let snapshot = registry.all();
        for session in &snapshot {
            registry.deregister(session.id);
        }

        assert_eq!(snapshot.len(), 3);
        assert!(registry.is_empty());
        assert!(snapshot.windows(2).all(|w| w[0].id < w[1].id));
    }
}
