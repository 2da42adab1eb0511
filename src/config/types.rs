use super::defaults::*;
use crate::telemetry::Threshold;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ============================================================================
// Gateway Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GatewayBindMode {
    Loopback,
    #[default]
    Lan,
    Custom,
}

impl std::str::FromStr for GatewayBindMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loopback" => Ok(Self::Loopback),
            "lan" => Ok(Self::Lan),
            "custom" => Ok(Self::Custom),
            _ => Err(format!("invalid bind mode: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default)]
    pub bind: GatewayBindMode,
    pub custom_bind_host: Option<String>,
    #[serde(default = "default_max_payload")]
    pub max_payload_bytes: usize,
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_GATEWAY_PORT,
            bind: GatewayBindMode::default(),
            custom_bind_host: None,
            max_payload_bytes: DEFAULT_WS_MAX_PAYLOAD,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
            cors_origins: default_cors_origins(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

fn default_gateway_port() -> u16 {
    DEFAULT_GATEWAY_PORT
}

fn default_max_payload() -> usize {
    DEFAULT_WS_MAX_PAYLOAD
}

fn default_outbound_queue() -> usize {
    DEFAULT_OUTBOUND_QUEUE
}

fn default_cors_origins() -> Vec<String> {
    vec![DEFAULT_CORS_ORIGIN.to_string()]
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

// ============================================================================
// Liveness / Alerts / Control
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessConfig {
    #[serde(default = "default_liveness_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_LIVENESS_INTERVAL_SECS,
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
        }
    }
}

fn default_liveness_interval() -> u64 {
    DEFAULT_LIVENESS_INTERVAL_SECS
}

fn default_stale_after() -> u64 {
    DEFAULT_STALE_AFTER_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertsConfig {
    #[serde(default = "default_alert_cooldown")]
    pub cooldown_secs: u64,
    #[serde(default = "default_alert_log_capacity")]
    pub log_capacity: usize,
    /// Replaces the built-in threshold table when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<BTreeMap<String, Threshold>>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: DEFAULT_ALERT_COOLDOWN_SECS,
            log_capacity: DEFAULT_ALERT_LOG_CAPACITY,
            thresholds: None,
        }
    }
}

fn default_alert_cooldown() -> u64 {
    DEFAULT_ALERT_COOLDOWN_SECS
}

fn default_alert_log_capacity() -> usize {
    DEFAULT_ALERT_LOG_CAPACITY
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Analysis
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_analysis_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_analysis_provider")]
    pub provider: String,
    #[serde(default = "default_analysis_model")]
    pub model: String,
    #[serde(default = "default_analysis_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_analysis_temperature")]
    pub temperature: f64,
    #[serde(default = "default_analysis_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_analysis_max_chars")]
    pub max_chars: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: DEFAULT_ANALYSIS_INTERVAL_SECS,
            provider: DEFAULT_ANALYSIS_PROVIDER.to_string(),
            model: DEFAULT_ANALYSIS_MODEL.to_string(),
            max_tokens: DEFAULT_ANALYSIS_MAX_TOKENS,
            temperature: DEFAULT_ANALYSIS_TEMPERATURE,
            request_timeout_secs: DEFAULT_ANALYSIS_TIMEOUT_SECS,
            max_chars: DEFAULT_ANALYSIS_MAX_CHARS,
        }
    }
}

fn default_analysis_interval() -> u64 {
    DEFAULT_ANALYSIS_INTERVAL_SECS
}

fn default_analysis_provider() -> String {
    DEFAULT_ANALYSIS_PROVIDER.to_string()
}

fn default_analysis_model() -> String {
    DEFAULT_ANALYSIS_MODEL.to_string()
}

fn default_analysis_max_tokens() -> u32 {
    DEFAULT_ANALYSIS_MAX_TOKENS
}

fn default_analysis_temperature() -> f64 {
    DEFAULT_ANALYSIS_TEMPERATURE
}

fn default_analysis_timeout() -> u64 {
    DEFAULT_ANALYSIS_TIMEOUT_SECS
}

fn default_analysis_max_chars() -> usize {
    DEFAULT_ANALYSIS_MAX_CHARS
}

// ============================================================================
// Model Providers
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelsConfig {
    #[serde(default)]
    pub providers: HashMap<String, ModelProviderConfig>,
}

impl ModelsConfig {
    pub fn apply_groq_key(&mut self, key: &str) {
        self.apply_key("groq", GROQ_BASE_URL, key);
    }

    pub fn apply_openai_key(&mut self, key: &str) {
        self.apply_key("openai", OPENAI_BASE_URL, key);
    }

    fn apply_key(&mut self, name: &str, base_url: &str, key: &str) {
        self.providers
            .entry(name.to_string())
            .and_modify(|p| p.api_key = Some(key.to_string()))
            .or_insert_with(|| ModelProviderConfig {
                base_url: base_url.to_string(),
                api_key: Some(key.to_string()),
            });
    }
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConfig {
    pub username: String,
    /// Plain password, hashed at startup.
    pub password: Option<String>,
    /// Pre-computed bcrypt hash; wins over `password`.
    pub password_hash: Option<String>,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "operator".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(default = "default_true")]
    pub require_for_control: bool,
    pub jwt_secret: Option<String>,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_hours: i64,
    /// Work factor for hashing plain passwords at startup.
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            require_for_control: true,
            jwt_secret: None,
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            users: Vec::new(),
        }
    }
}

fn default_token_ttl() -> i64 {
    DEFAULT_TOKEN_TTL_HOURS
}

fn default_bcrypt_cost() -> u32 {
    DEFAULT_BCRYPT_COST
}
