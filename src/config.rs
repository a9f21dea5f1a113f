use chrono::Duration;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::models::{FollowUpPolicy, MatchingPolicy, MeetingType, ScoringWeights};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    pub collaborators: CollaboratorSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub scoring: ScoringSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    #[serde(default)]
    pub url: Option<String>,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: None,
            max_connections: None,
            min_connections: None,
            acquire_timeout_secs: None,
            idle_timeout_secs: None,
        }
    }
}

fn default_backend() -> StorageBackend { StorageBackend::Memory }

#[derive(Debug, Clone, Deserialize)]
pub struct CollaboratorSettings {
    pub verification_url: String,
    pub payment_url: String,
    #[serde(default)]
    pub notification_url: Option<String>,
    pub api_key: String,
    pub timeout_secs: Option<u64>,
    pub verification_cache_ttl_secs: Option<u64>,
    pub verification_cache_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    #[serde(default = "default_min_overlap_minutes")]
    pub min_overlap_minutes: i64,
    #[serde(default = "default_confirmation_window_hours")]
    pub confirmation_window_hours: i64,
    #[serde(default = "default_pass_interval_secs")]
    pub pass_interval_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_orphan_grace_secs")]
    pub orphan_grace_secs: i64,
    #[serde(default = "default_non_response_policy")]
    pub non_response_policy: FollowUpPolicy,
    #[serde(default = "default_decline_policy")]
    pub decline_policy: FollowUpPolicy,
    #[serde(default = "default_cooldown_hours")]
    pub cooldown_hours: i64,
    #[serde(default = "default_entry_fee_cents")]
    pub entry_fee_cents: u64,
    #[serde(default = "default_true")]
    pub refund_cancelled: bool,
    #[serde(default = "default_meeting_minutes")]
    pub default_meeting_minutes: i64,
    #[serde(default)]
    pub venues: HashMap<MeetingType, String>,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            min_overlap_minutes: default_min_overlap_minutes(),
            confirmation_window_hours: default_confirmation_window_hours(),
            pass_interval_secs: default_pass_interval_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            orphan_grace_secs: default_orphan_grace_secs(),
            non_response_policy: default_non_response_policy(),
            decline_policy: default_decline_policy(),
            cooldown_hours: default_cooldown_hours(),
            entry_fee_cents: default_entry_fee_cents(),
            refund_cancelled: default_true(),
            default_meeting_minutes: default_meeting_minutes(),
            venues: HashMap::new(),
        }
    }
}

fn default_min_overlap_minutes() -> i64 { 60 }
fn default_confirmation_window_hours() -> i64 { 24 }
fn default_pass_interval_secs() -> u64 { 60 }
fn default_sweep_interval_secs() -> u64 { 300 }
fn default_orphan_grace_secs() -> i64 { 300 }
fn default_non_response_policy() -> FollowUpPolicy { FollowUpPolicy::Cancel }
fn default_decline_policy() -> FollowUpPolicy { FollowUpPolicy::RequeueWithCooldown }
fn default_cooldown_hours() -> i64 { 24 }
fn default_entry_fee_cents() -> u64 { 2500 }
fn default_true() -> bool { true }
fn default_meeting_minutes() -> i64 { 90 }

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringSettings {
    #[serde(default)]
    pub weights: WeightsConfig,
    #[serde(default = "default_overlap_saturation_minutes")]
    pub overlap_saturation_minutes: i64,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            weights: WeightsConfig::default(),
            overlap_saturation_minutes: default_overlap_saturation_minutes(),
        }
    }
}

fn default_overlap_saturation_minutes() -> i64 { 180 }

#[derive(Debug, Clone, Deserialize)]
pub struct WeightsConfig {
    #[serde(default = "default_overlap_weight")]
    pub overlap: f64,
    #[serde(default = "default_wait_parity_weight")]
    pub wait_parity: f64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            overlap: default_overlap_weight(),
            wait_parity: default_wait_parity_weight(),
        }
    }
}

fn default_overlap_weight() -> f64 { 0.70 }
fn default_wait_parity_weight() -> f64 { 0.30 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with LUME__)
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., LUME__SERVER__PORT -> server.port
            .add_source(
                Environment::with_prefix("LUME")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        substitute_env_vars(settings)?.try_deserialize::<Self>()?.validated()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("LUME")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize::<Self>()?.validated()
    }

    /// Reject values the engine cannot run with
    fn validated(self) -> Result<Self, ConfigError> {
        if self.matching.pass_interval_secs == 0 {
            return Err(ConfigError::Message(
                "matching.pass_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.matching.sweep_interval_secs == 0 {
            return Err(ConfigError::Message(
                "matching.sweep_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(self)
    }

    pub fn to_policy(&self) -> MatchingPolicy {
        let m = &self.matching;
        MatchingPolicy {
            min_overlap: Duration::minutes(m.min_overlap_minutes),
            overlap_saturation: Duration::minutes(self.scoring.overlap_saturation_minutes),
            confirmation_window: Duration::hours(m.confirmation_window_hours),
            cooldown: Duration::hours(m.cooldown_hours),
            orphan_grace: Duration::seconds(m.orphan_grace_secs),
            non_response: m.non_response_policy,
            decline: m.decline_policy,
            entry_fee_cents: m.entry_fee_cents,
            refund_cancelled: m.refund_cancelled,
            default_meeting: Duration::minutes(m.default_meeting_minutes),
            venues: m.venues.clone(),
        }
    }

    pub fn to_weights(&self) -> ScoringWeights {
        ScoringWeights {
            overlap: self.scoring.weights.overlap,
            wait_parity: self.scoring.weights.wait_parity,
        }
    }
}

/// `DATABASE_URL` wins over `storage.url` when set
fn substitute_env_vars(settings: Config) -> Result<Config, ConfigError> {
    match std::env::var("DATABASE_URL") {
        Ok(url) => Config::builder()
            .add_source(settings)
            .set_override("storage.url", url)?
            .build(),
        Err(_) => Ok(settings),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_weights() {
        let weights = WeightsConfig::default();
        assert_eq!(weights.overlap, 0.70);
        assert_eq!(weights.wait_parity, 0.30);
    }

    #[test]
    fn test_default_logging() {
        let level = default_log_level();
        let format = default_log_format();
        assert_eq!(level, "info");
        assert_eq!(format, "json");
    }

    #[test]
    fn test_default_matching_matches_policy_defaults() {
        let settings = Settings {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
                workers: None,
            },
            storage: StorageSettings::default(),
            collaborators: CollaboratorSettings {
                verification_url: "http://localhost:9001".to_string(),
                payment_url: "http://localhost:9002".to_string(),
                notification_url: None,
                api_key: "test".to_string(),
                timeout_secs: None,
                verification_cache_ttl_secs: None,
                verification_cache_size: None,
            },
            matching: MatchingSettings::default(),
            scoring: ScoringSettings::default(),
            logging: LoggingSettings::default(),
        };

        assert_eq!(settings.to_policy(), MatchingPolicy::default());
        assert_eq!(settings.to_weights(), ScoringWeights::default());
        assert_eq!(settings.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("lume-blind-date-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[server]
host = "0.0.0.0"
port = 9090

[storage]
backend = "postgres"
url = "postgres://localhost/blind_date"

[collaborators]
verification_url = "http://verify"
payment_url = "http://pay"
api_key = "secret"

[matching]
confirmation_window_hours = 48
non_response_policy = "requeue_with_cooldown"

[matching.venues]
coffee = "Corner Cafe"
"#
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.storage.backend, StorageBackend::Postgres);

        let policy = settings.to_policy();
        assert_eq!(policy.confirmation_window, Duration::hours(48));
        assert_eq!(policy.non_response, FollowUpPolicy::RequeueWithCooldown);
        assert_eq!(policy.venue(MeetingType::Coffee), "Corner Cafe");
        assert_eq!(policy.venue(MeetingType::Dinner), "To be arranged");
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let path = std::env::temp_dir().join(format!("lume-blind-date-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[server]
host = "0.0.0.0"
port = 9090

[collaborators]
verification_url = "http://verify"
payment_url = "http://pay"
api_key = "secret"

[matching]
sweep_interval_secs = 0
"#
        )
        .unwrap();

        let result = Settings::load_from(&path);
        std::fs::remove_file(&path).ok();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("sweep_interval_secs"), "unexpected error: {}", err);
    }
}
