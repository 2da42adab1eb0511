//! Default configuration constants used across the gateway.

/// Default gateway port.
pub const DEFAULT_GATEWAY_PORT: u16 = 3000;

/// Default WebSocket max inbound payload (100 KB).
pub const DEFAULT_WS_MAX_PAYLOAD: usize = 100 * 1024;

/// Default per-session outbound queue depth.
pub const DEFAULT_OUTBOUND_QUEUE: usize = 64;

/// Default dashboard origin allowed by CORS.
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3001";

/// Default number of snapshots kept for `/api/history`.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Heartbeat probe interval.
pub const DEFAULT_LIVENESS_INTERVAL_SECS: u64 = 30;

/// Silence after which a session is considered dead even if flagged alive.
pub const DEFAULT_STALE_AFTER_SECS: u64 = 60;

/// Per-sensor alert cooldown.
pub const DEFAULT_ALERT_COOLDOWN_SECS: u64 = 30;

/// Alert log length.
pub const DEFAULT_ALERT_LOG_CAPACITY: usize = 50;

/// Minimum spacing between analysis calls (5 minutes).
pub const DEFAULT_ANALYSIS_INTERVAL_SECS: u64 = 5 * 60;

pub const DEFAULT_ANALYSIS_PROVIDER: &str = "groq";
pub const DEFAULT_ANALYSIS_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_ANALYSIS_MAX_TOKENS: u32 = 200;
pub const DEFAULT_ANALYSIS_TEMPERATURE: f64 = 0.6;
pub const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ANALYSIS_MAX_CHARS: usize = 600;

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Issued tokens are valid for a week.
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24 * 7;

pub const DEFAULT_BCRYPT_COST: u32 = 12;

/// Account seeded when no users are configured.
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";
