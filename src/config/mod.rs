mod defaults;
mod types;
mod validation;

pub use defaults::*;
pub use types::*;
pub use validation::*;

use crate::telemetry::Thresholds;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level CleanKiln gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Config {
    /// Load configuration from file, environment, and defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(find_config_file);

        let mut config = match config_path {
            Some(config_path) if config_path.exists() => {
                info!("Loading config from {}", config_path.display());
                load_config_file(&config_path)?
            }
            Some(config_path) => {
                anyhow::bail!("Config file '{}' does not exist", config_path.display())
            }
            None => {
                info!("No config file found, using defaults");
                Config::default()
            }
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Write default configuration to a file.
    pub fn write_default(path: &str) -> Result<()> {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {path}"))?;
        Ok(())
    }

    /// Threshold table in effect: the configured one, or the built-in table.
    pub fn thresholds(&self) -> Thresholds {
        match &self.alerts.thresholds {
            Some(table) if !table.is_empty() => Thresholds::new(
                table
                    .iter()
                    .map(|(k, t)| (k.clone(), t.clone()))
                    .collect(),
            ),
            _ => Thresholds::default(),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("CLEANKILN_PORT") {
            if let Ok(port) = port.parse() {
                self.gateway.port = port;
            }
        }

        if let Ok(bind) = std::env::var("CLEANKILN_BIND") {
            if let Ok(mode) = bind.parse() {
                self.gateway.bind = mode;
            }
        }

        if let Ok(key) = std::env::var("GROQ_API_KEY") {
            self.models.apply_groq_key(&key);
        }

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.models.apply_openai_key(&key);
        }

        if let Ok(secret) = std::env::var("JWT_SECRET") {
            if !secret.is_empty() {
                self.auth.jwt_secret = Some(secret);
            }
        }
    }
}

/// Find the configuration file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    let candidates = [
        PathBuf::from("cleankiln.json"),
        PathBuf::from("cleankiln.yaml"),
        PathBuf::from("cleankiln.yml"),
        PathBuf::from("cleankiln.toml"),
    ];

    for path in &candidates {
        if path.exists() {
            return Some(path.clone());
        }
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(".cleankiln").join("config.json");
        if home_config.exists() {
            return Some(home_config);
        }
    }

    None
}

/// Load configuration from a file path, picking the parser by extension.
fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config(&content, path.extension().and_then(|e| e.to_str()))
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config(content: &str, extension: Option<&str>) -> Result<Config> {
    let config = match extension {
        Some("yaml") | Some("yml") => serde_yaml::from_str(content)?,
        Some("toml") => toml::from_str(content)?,
        _ => {
            // JSON5 is a superset of JSON; fall back for its error message.
            match json5::from_str(content) {
                Ok(config) => config,
                Err(_) => serde_json::from_str(content)?,
            }
        }
    };
    Ok(config)
}
