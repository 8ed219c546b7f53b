use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration loaded from `~/.mission-control/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub rollout: RolloutConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            schedule: ScheduleConfig::default(),
            execution: ExecutionConfig::default(),
            security: SecurityConfig::default(),
            observability: ObservabilityConfig::default(),
            rollout: RolloutConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Load config from `~/.mission-control/config.toml`, falling back to
    /// defaults when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(CoreConfig::default())
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: CoreConfig = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mission-control")
            .join("config.toml")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_secs")]
    pub default_interval_secs: u64,
    #[serde(default = "default_jitter_secs")]
    pub default_jitter_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: default_interval_secs(),
            default_jitter_secs: default_jitter_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    1800
}
fn default_jitter_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            lock_ttl_secs: default_lock_ttl_secs(),
            lease_ttl_secs: default_lease_ttl_secs(),
        }
    }
}

fn default_lock_ttl_secs() -> u64 {
    600
}
fn default_lease_ttl_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_credential_min_ttl_secs")]
    pub credential_min_ttl_secs: u64,
    #[serde(default = "default_credential_max_ttl_secs")]
    pub credential_max_ttl_secs: u64,
    #[serde(default = "default_sso_pending_ttl_secs")]
    pub sso_pending_ttl_secs: u64,
    #[serde(default = "default_sso_session_ttl_secs")]
    pub sso_session_ttl_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            credential_min_ttl_secs: default_credential_min_ttl_secs(),
            credential_max_ttl_secs: default_credential_max_ttl_secs(),
            sso_pending_ttl_secs: default_sso_pending_ttl_secs(),
            sso_session_ttl_secs: default_sso_session_ttl_secs(),
        }
    }
}

fn default_credential_min_ttl_secs() -> u64 {
    300
}
fn default_credential_max_ttl_secs() -> u64 {
    3600
}
fn default_sso_pending_ttl_secs() -> u64 {
    300
}
fn default_sso_session_ttl_secs() -> u64 {
    28800
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_export_ring_capacity")]
    pub export_ring_capacity: usize,
    #[serde(default = "default_alert_suppression_secs")]
    pub default_alert_suppression_secs: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            export_ring_capacity: default_export_ring_capacity(),
            default_alert_suppression_secs: default_alert_suppression_secs(),
        }
    }
}

fn default_export_ring_capacity() -> usize {
    5000
}
fn default_alert_suppression_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutConfig {
    #[serde(default = "default_bulk_preview_ttl_secs")]
    pub bulk_preview_ttl_secs: u64,
    #[serde(default = "default_ephemeral_env_ttl_secs")]
    pub ephemeral_env_ttl_secs: u64,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            bulk_preview_ttl_secs: default_bulk_preview_ttl_secs(),
            ephemeral_env_ttl_secs: default_ephemeral_env_ttl_secs(),
        }
    }
}

fn default_bulk_preview_ttl_secs() -> u64 {
    900
}
fn default_ephemeral_env_ttl_secs() -> u64 {
    7200
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_policy_base_dir")]
    pub base_dir: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            base_dir: default_policy_base_dir(),
        }
    }
}

fn default_policy_base_dir() -> String {
    "~/.mission-control/policy".into()
}
