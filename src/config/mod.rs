//! Configuration.
//!
//! Two layers: process [`Settings`] come from environment variables once at
//! startup; the pipeline [`Config`] is a TOML document re-read by the workers
//! on every cycle through a [`ConfigSource`].

pub mod source;

use chrono::{DateTime, TimeDelta, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::template::Grammar;

pub use source::ConfigSource;

pub const MIN_SEARCH_INTERVAL_SECS: u64 = 10;
pub const MIN_ACTION_INTERVAL_SECS: u64 = 20;
pub const MAX_JITTER: f64 = 0.9;

// ---------------------------------------------------------------------------
// Settings (environment)
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Settings {
    pub config_path: PathBuf,
    pub state_dir: PathBuf,
    pub metadata_token: Option<SecretString>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Settings {
    /// Load settings from environment variables. Every value has a default.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Self {
        Self {
            config_path: std::env::var("HARVEST_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("harvest.toml")),
            state_dir: std::env::var("HARVEST_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
            metadata_token: std::env::var("HARVEST_METADATA_TOKEN")
                .ok()
                .filter(|t| !t.is_empty())
                .map(SecretString::from),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }

    pub fn pending_path(&self) -> PathBuf {
        self.state_dir.join("pending.txt")
    }

    pub fn processed_path(&self) -> PathBuf {
        self.state_dir.join("processed.txt")
    }
}

// ---------------------------------------------------------------------------
// Config (TOML, hot-reloadable)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search: SearchConfig,
    pub action: ActionConfig,
    pub grammar: Grammar,
    pub hooks: HookConfig,
    pub metadata: MetadataConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Read at startup only.
    pub enabled: bool,
    pub interval_secs: u64,
    pub keywords: Vec<String>,
    /// Identifiers never queued, whatever a search returns.
    pub exclude: Vec<String>,
    pub jitter: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            keywords: vec!["rust".to_string(), "tokio".to_string()],
            exclude: Vec::new(),
            jitter: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionConfig {
    pub interval_secs: u64,
    pub batch_size: usize,
    pub cooldown_secs: u64,
    /// Items published before this are skipped (recorded as processed).
    pub min_publish_time: DateTime<Utc>,
    /// Items older than this are skipped. 0 disables the check.
    pub max_age_secs: u64,
    /// Processed entries older than this are evicted. 0 keeps them forever.
    pub retention_secs: u64,
    pub sweep_interval_secs: u64,
    pub jitter: f64,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            interval_secs: 120,
            batch_size: 3,
            cooldown_secs: 2 * 3600,
            min_publish_time: DateTime::<Utc>::from_timestamp(946_684_800, 0)
                .unwrap_or_default(),
            max_age_secs: 10 * 86_400,
            retention_secs: 10 * 86_400,
            sweep_interval_secs: 3600,
            jitter: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    pub search: Option<PathBuf>,
    pub act: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            search: None,
            act: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// URL with an `{id}` placeholder. No URL means publish times are unknown.
    pub url: Option<String>,
    /// JSON pointer to the publish time (epoch seconds).
    pub field: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            url: None,
            field: "/data/pubdate".to_string(),
        }
    }
}

impl Config {
    /// Parse a TOML document and clamp values to their minimums.
    pub fn from_toml(text: &str) -> crate::error::Result<Self> {
        let config: Config =
            toml::from_str(text).map_err(|e| crate::error::Error::Config(e.to_string()))?;
        Ok(config.clamped())
    }

    pub fn clamped(mut self) -> Self {
        self.search.interval_secs = self.search.interval_secs.max(MIN_SEARCH_INTERVAL_SECS);
        self.search.jitter = clamp_jitter(self.search.jitter);
        self.action.interval_secs = self.action.interval_secs.max(MIN_ACTION_INTERVAL_SECS);
        self.action.batch_size = self.action.batch_size.max(1);
        self.action.sweep_interval_secs = self.action.sweep_interval_secs.max(1);
        self.action.jitter = clamp_jitter(self.action.jitter);
        self.hooks.timeout_secs = self.hooks.timeout_secs.max(1);
        self
    }
}

impl SearchConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl ActionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn cooldown(&self) -> TimeDelta {
        delta_secs(self.cooldown_secs)
    }

    pub fn max_age(&self) -> Option<TimeDelta> {
        (self.max_age_secs > 0).then(|| delta_secs(self.max_age_secs))
    }

    pub fn retention(&self) -> Option<TimeDelta> {
        (self.retention_secs > 0).then(|| delta_secs(self.retention_secs))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn clamp_jitter(jitter: f64) -> f64 {
    if jitter.is_finite() {
        jitter.clamp(0.0, MAX_JITTER)
    } else {
        0.0
    }
}

/// Seconds as a chrono delta, saturating at `TimeDelta::MAX`.
fn delta_secs(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

/// Written to disk when no config file exists. Parses to `Config::default()`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# harvest pipeline configuration. Re-read on every worker cycle.

[search]
# Read at startup only.
enabled = true
interval_secs = 30
keywords = ["rust", "tokio"]
exclude = []
jitter = 0.25

[action]
interval_secs = 120
batch_size = 3
cooldown_secs = 7200
min_publish_time = "2000-01-01T00:00:00Z"
max_age_secs = 864000
retention_secs = 864000
sweep_interval_secs = 3600
jitter = 0.25

[grammar]
templates = []

[grammar.vars]

[hooks]
# search = "hooks/search"
# act = "hooks/act"
timeout_secs = 120

[metadata]
# url = "https://example.invalid/items/{id}"
field = "/data/pubdate"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_document_matches_default_config() {
        let parsed = Config::from_toml(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn intervals_are_clamped_to_minimums() {
        let config = Config::from_toml(
            r#"
            [search]
            interval_secs = 1
            jitter = 5.0
            [action]
            interval_secs = 2
            batch_size = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.search.interval_secs, MIN_SEARCH_INTERVAL_SECS);
        assert_eq!(config.search.jitter, MAX_JITTER);
        assert_eq!(config.action.interval_secs, MIN_ACTION_INTERVAL_SECS);
        assert_eq!(config.action.batch_size, 1);
    }

    #[test]
    fn oversized_windows_saturate() {
        let action = ActionConfig {
            cooldown_secs: u64::MAX,
            max_age_secs: 10_000_000_000_000,
            retention_secs: i64::MAX as u64,
            ..ActionConfig::default()
        };
        assert_eq!(action.cooldown(), TimeDelta::MAX);
        assert_eq!(
            action.max_age(),
            Some(TimeDelta::seconds(10_000_000_000_000))
        );
        assert_eq!(action.retention(), Some(TimeDelta::MAX));
    }

    #[test]
    fn grammar_section_parses() {
        let config = Config::from_toml(
            r#"
            [grammar]
            templates = [":a; world"]
            [grammar.vars]
            a = ["hello", "hi"]
            "#,
        )
        .unwrap();
        assert_eq!(config.grammar.templates, vec![":a; world".to_string()]);
        assert_eq!(config.grammar.vars["a"].len(), 2);
    }

    #[test]
    fn zero_windows_disable_checks() {
        let mut action = ActionConfig::default();
        action.max_age_secs = 0;
        action.retention_secs = 0;
        assert!(action.max_age().is_none());
        assert!(action.retention().is_none());
    }

    #[test]
    fn malformed_document_is_a_config_error() {
        let err = Config::from_toml("[search\nnope").unwrap_err();
        assert!(matches!(err, crate::error::Error::Config(_)));
    }
}
