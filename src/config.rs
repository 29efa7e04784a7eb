//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
#[allow(dead_code)]
pub enum ConfigError {
    #[error("Failed to load environment variables: {0}")]
    EnvLoad(#[from] dotenvy::Error),

    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0),
            port: 8000,
        }
    }
}

/// Screening stage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScreeningConfig {
    /// Sampled frames per content-second on the cheap path
    pub sample_fps: f64,
    /// Risk score above which an item is escalated to deep analysis
    pub escalation_threshold: f64,
    /// Risk score above which the escalation message is marked high priority
    pub high_priority_threshold: f64,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            sample_fps: 0.5,
            escalation_threshold: 0.6,
            high_priority_threshold: 0.7,
        }
    }
}

/// Deep-analysis stage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Sampled frames per content-second on the deep path
    pub sample_fps: f64,
    /// Version tag recorded in item provenance
    pub model_version: String,
    /// Endpoint for the external custom NSFW scorer, if deployed
    pub nsfw_endpoint: Option<String>,
    /// Endpoint for the external custom violence scorer, if deployed
    pub violence_endpoint: Option<String>,
    /// Bearer key for the custom scorer endpoints
    pub endpoint_key: Option<String>,
    /// Timeout for a single external scorer call
    pub scorer_timeout: Duration,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_fps: 1.0,
            model_version: "v1.0.0".to_string(),
            nsfw_endpoint: None,
            violence_endpoint: None,
            endpoint_key: None,
            scorer_timeout: Duration::from_secs(5),
        }
    }
}

/// Decision engine thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct DecisionConfig {
    /// Final score below this auto-approves
    pub approve_threshold: f64,
    /// Final score above this auto-rejects
    pub reject_threshold: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            approve_threshold: 0.2,
            reject_threshold: 0.8,
        }
    }
}

/// Work queue configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Long-poll wait for an empty receive
    pub wait: Duration,
    /// Visibility window for intake (screening) leases
    pub intake_lease: Duration,
    /// Visibility window for escalation (deep-analysis) leases
    pub escalation_lease: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(20),
            intake_lease: Duration::from_secs(300),
            escalation_lease: Duration::from_secs(600),
        }
    }
}

/// Reconciliation worker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileConfig {
    /// Sweep cadence
    pub interval: Duration,
    /// Age past which a non-terminal item is presumed lost
    pub staleness: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            staleness: Duration::from_secs(3600),
        }
    }
}

/// Notification collaborator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// Default webhook when an item carries no callback of its own
    pub default_webhook: Option<String>,
    pub timeout: Duration,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            default_webhook: None,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub server: ServerConfig,
    pub screening: ScreeningConfig,
    pub analysis: AnalysisConfig,
    pub decision: DecisionConfig,
    pub queue: QueueConfig,
    pub reconcile: ReconcileConfig,
    pub notify: NotifyConfig,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        let server = ServerConfig {
            host: env_parse("HOST", ServerConfig::default().host)?,
            port: env_parse("PORT", ServerConfig::default().port)?,
        };

        let screening = ScreeningConfig {
            sample_fps: env_parse("SCREENING_SAMPLE_FPS", ScreeningConfig::default().sample_fps)?,
            escalation_threshold: env_parse(
                "ESCALATION_THRESHOLD",
                ScreeningConfig::default().escalation_threshold,
            )?,
            high_priority_threshold: env_parse(
                "HIGH_PRIORITY_THRESHOLD",
                ScreeningConfig::default().high_priority_threshold,
            )?,
        };

        let analysis = AnalysisConfig {
            sample_fps: env_parse("ANALYSIS_SAMPLE_FPS", AnalysisConfig::default().sample_fps)?,
            model_version: std::env::var("MODEL_VERSION")
                .unwrap_or_else(|_| AnalysisConfig::default().model_version),
            nsfw_endpoint: std::env::var("NSFW_MODEL_ENDPOINT").ok(),
            violence_endpoint: std::env::var("VIOLENCE_MODEL_ENDPOINT").ok(),
            endpoint_key: std::env::var("MODEL_ENDPOINT_KEY").ok(),
            scorer_timeout: env_secs("SCORER_TIMEOUT_SECS", 5)?,
        };

        let decision = DecisionConfig {
            approve_threshold: env_parse(
                "AUTO_APPROVE_THRESHOLD",
                DecisionConfig::default().approve_threshold,
            )?,
            reject_threshold: env_parse(
                "AUTO_REJECT_THRESHOLD",
                DecisionConfig::default().reject_threshold,
            )?,
        };

        let queue = QueueConfig {
            wait: env_secs("QUEUE_WAIT_SECS", 20)?,
            intake_lease: env_secs("INTAKE_LEASE_SECS", 300)?,
            escalation_lease: env_secs("ESCALATION_LEASE_SECS", 600)?,
        };

        let reconcile = ReconcileConfig {
            interval: env_secs("RECONCILE_INTERVAL_SECS", 60)?,
            staleness: env_secs("RECONCILE_STALENESS_SECS", 3600)?,
        };

        let notify = NotifyConfig {
            default_webhook: std::env::var("NOTIFICATION_WEBHOOK_URL").ok(),
            timeout: env_secs("NOTIFICATION_TIMEOUT_SECS", 5)?,
        };

        let settings = Self {
            server,
            screening,
            analysis,
            decision,
            queue,
            reconcile,
            notify,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("ESCALATION_THRESHOLD", self.screening.escalation_threshold),
            ("AUTO_APPROVE_THRESHOLD", self.decision.approve_threshold),
            ("AUTO_REJECT_THRESHOLD", self.decision.reject_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.decision.approve_threshold > self.decision.reject_threshold {
            return Err(ConfigError::InvalidValue(
                "AUTO_APPROVE_THRESHOLD must not exceed AUTO_REJECT_THRESHOLD".to_string(),
            ));
        }
        if self.screening.sample_fps <= 0.0 || self.analysis.sample_fps <= 0.0 {
            return Err(ConfigError::InvalidValue(
                "sample rates must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse an environment variable, falling back to a default when unset
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{}={}", name, raw))),
        Err(_) => Ok(default),
    }
}

/// Parse a whole-second duration from the environment
fn env_secs(name: &str, default_secs: u64) -> Result<Duration, ConfigError> {
    Ok(Duration::from_secs(env_parse(name, default_secs)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let settings = Settings::default();
        assert_eq!(settings.screening.escalation_threshold, 0.6);
        assert_eq!(settings.decision.approve_threshold, 0.2);
        assert_eq!(settings.decision.reject_threshold, 0.8);
    }

    #[test]
    fn test_default_cadences() {
        let settings = Settings::default();
        assert_eq!(settings.reconcile.interval, Duration::from_secs(60));
        assert_eq!(settings.reconcile.staleness, Duration::from_secs(3600));
        assert_eq!(settings.queue.wait, Duration::from_secs(20));
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let mut settings = Settings::default();
        settings.decision.approve_threshold = 0.9;
        assert!(settings.validate().is_err());
    }
}
