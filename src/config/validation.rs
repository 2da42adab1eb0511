use super::{Config, GatewayBindMode};
use anyhow::Result;
use tracing::warn;

/// Validation errors for configuration.
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

fn error(path: impl Into<String>, message: impl Into<String>) -> ConfigValidationError {
    ConfigValidationError {
        path: path.into(),
        message: message.into(),
    }
}

/// Validate a configuration object.
pub fn validate_config(config: &Config) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();

    if config.gateway.port == 0 {
        errors.push(error("gateway.port", "Port must be greater than 0"));
    }

    if config.gateway.bind == GatewayBindMode::Custom && config.gateway.custom_bind_host.is_none() {
        errors.push(error(
            "gateway.customBindHost",
            "Custom bind mode requires customBindHost",
        ));
    }

    if config.gateway.outbound_queue == 0 {
        errors.push(error("gateway.outboundQueue", "Queue depth must be greater than 0"));
    }

    if config.liveness.interval_secs == 0 {
        errors.push(error("liveness.intervalSecs", "Interval must be greater than 0"));
    } else if config.liveness.stale_after_secs < config.liveness.interval_secs {
        errors.push(error(
            "liveness.staleAfterSecs",
            "Stale window must be at least the probe interval",
        ));
    }

    if config.analysis.interval_secs == 0 {
        errors.push(error("analysis.intervalSecs", "Interval must be greater than 0"));
    }

    if config.analysis.enabled && !config.models.providers.contains_key(&config.analysis.provider) {
        warn!(
            "Analysis provider '{}' has no credentials; fallback text will be broadcast",
            config.analysis.provider
        );
    }

    if let Some(table) = &config.alerts.thresholds {
        for (key, threshold) in table {
            if threshold.warning > threshold.danger {
                errors.push(error(
                    format!("alerts.thresholds.{key}"),
                    "Warning level must not exceed danger level",
                ));
            }
        }
    }

    for (name, provider) in &config.models.providers {
        if provider.base_url.is_empty() {
            errors.push(error(
                format!("models.providers.{name}.baseUrl"),
                "Provider base URL is required",
            ));
        }
    }

    if !(4..=31).contains(&config.auth.bcrypt_cost) {
        errors.push(error("auth.bcryptCost", "Cost must be between 4 and 31"));
    }

    for (idx, user) in config.auth.users.iter().enumerate() {
        if user.password.is_none() && user.password_hash.is_none() {
            errors.push(error(
                format!("auth.users[{idx}]"),
                format!("User '{}' needs a password or passwordHash", user.username),
            ));
        }
    }

    errors
}

/// Validate configuration and return Result.
pub fn validate_config_object(config: &Config) -> Result<()> {
    let errors = validate_config(config);
    if errors.is_empty() {
        Ok(())
    } else {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        anyhow::bail!("Configuration validation failed:\n{}", messages.join("\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelProviderConfig, UserConfig};
    use crate::telemetry::Threshold;

    fn paths(config: &Config) -> Vec<String> {
        validate_config(config).into_iter().map(|e| e.path).collect()
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config_object(&Config::default()).is_ok());
    }

    #[test]
    fn stale_window_must_cover_interval() {
        let mut config = Config::default();
        config.liveness.interval_secs = 30;
        config.liveness.stale_after_secs = 10;
        assert_eq!(paths(&config), vec!["liveness.staleAfterSecs"]);
    }

    #[test]
    fn zero_intervals_rejected() {
        let mut config = Config::default();
        config.gateway.port = 0;
        config.liveness.interval_secs = 0;
        config.analysis.interval_secs = 0;
        let found = paths(&config);
        assert!(found.contains(&"gateway.port".to_string()));
        assert!(found.contains(&"liveness.intervalSecs".to_string()));
        assert!(found.contains(&"analysis.intervalSecs".to_string()));
    }

    #[test]
    fn inverted_threshold_rejected() {
        let mut config = Config::default();
        config.alerts.thresholds = Some(
            [(
                "pm25".to_string(),
                Threshold {
                    good: 10.0,
                    warning: 80.0,
                    danger: 50.0,
                    unit: "µg/m³".to_string(),
                    label: "PM2.5".to_string(),
                },
            )]
            .into_iter()
            .collect(),
        );
        assert_eq!(paths(&config), vec!["alerts.thresholds.pm25"]);
    }

    #[test]
    fn provider_and_user_checks() {
        let mut config = Config::default();
        config.models.providers.insert(
            "groq".to_string(),
            ModelProviderConfig {
                base_url: String::new(),
                api_key: Some("k".to_string()),
            },
        );
        config.auth.users.push(UserConfig {
            username: "ops".to_string(),
            password: None,
            password_hash: None,
            role: "admin".to_string(),
        });
        let found = paths(&config);
        assert!(found.contains(&"models.providers.groq.baseUrl".to_string()));
        assert!(found.contains(&"auth.users[0]".to_string()));
    }
}
