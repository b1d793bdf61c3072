use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, de::Error as _};
use tracing::trace;

use crate::error::{MonitorError, MonitorResult};

/// Threshold defaults, two tiers per monitored quantity
const DEFAULT_THRESHOLDS: &[(&str, f64)] = &[
    ("delivery_rate_critical", 0.5),
    ("delivery_rate_warning", 0.8),
    ("connection_failure_rate_critical", 0.3),
    ("connection_failure_rate_warning", 0.5),
    ("error_rate_critical", 0.1),
    ("error_rate_warning", 0.05),
    ("memory_usage_critical", 0.9),
    ("memory_usage_warning", 0.8),
    ("cpu_usage_critical", 0.95),
    ("cpu_usage_warning", 0.8),
    ("avg_delivery_time_critical", 10_000.0),
    ("avg_delivery_time_warning", 5_000.0),
    ("queue_depth_critical", 1_000.0),
    ("queue_depth_warning", 500.0),
    ("db_response_time_critical", 5_000.0),
    ("db_response_time_warning", 1_000.0),
];

/// Named numeric boundaries, e.g. `delivery_rate_critical -> 0.5`
///
/// A key that is absent means the corresponding rule is not configured and gets skipped.
/// Deserializing merges the supplied keys over [`Thresholds::default`]; a key set to
/// `false` (or `null` in JSON) removes it, disabling that rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Thresholds(BTreeMap<String, f64>);

impl Thresholds {
    /// Thresholds without any configured rule
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<f64> {
        self.0.remove(key)
    }

    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.set(key, value);
        self
    }

    pub fn without(mut self, key: &str) -> Self {
        self.remove(key);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(key, value)| (key.as_str(), *value))
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self(
            DEFAULT_THRESHOLDS
                .iter()
                .map(|(key, value)| (key.to_string(), *value))
                .collect(),
        )
    }
}

impl<'de> Deserialize<'de> for Thresholds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let overrides = BTreeMap::<String, ThresholdOverride>::deserialize(deserializer)?;
        let mut thresholds = Thresholds::default();
        for (key, value) in overrides {
            match value {
                ThresholdOverride::Limit(limit) => thresholds.set(key, limit),
                ThresholdOverride::Disabled(None | Some(false)) => {
                    thresholds.remove(&key);
                }
                ThresholdOverride::Disabled(Some(true)) => {
                    return Err(D::Error::custom(format!(
                        "threshold {key} must be a number, or false to disable it"
                    )));
                }
            }
        }
        Ok(thresholds)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ThresholdOverride {
    Limit(f64),
    Disabled(Option<bool>),
}

/// Where delivery and connection stats are polled from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub url: String,
    pub token: Option<String>,
}

/// Downstream dependency to probe for round-trip time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alert {
    Discord(Discord),
    Webhook(Webhook),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discord {
    pub url: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between two ticks
    #[serde(default = "default_interval")]
    pub monitoring_interval: u64,

    /// Snapshots kept per metric category
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    #[serde(default = "default_alert_history_capacity")]
    pub alert_history_capacity: usize,

    /// Points returned in a dashboard time series
    #[serde(default = "default_dashboard_points")]
    pub dashboard_points: usize,

    #[serde(default)]
    pub thresholds: Thresholds,

    #[serde(default = "default_auto_recovery")]
    pub auto_recovery: bool,

    #[serde(default = "default_recovery_timeout")]
    pub recovery_timeout_secs: u64,

    pub source: Option<SourceConfig>,

    pub probe: Option<ProbeConfig>,

    #[serde(default)]
    pub alerts: Vec<Alert>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            monitoring_interval: default_interval(),
            history_capacity: default_history_capacity(),
            alert_history_capacity: default_alert_history_capacity(),
            dashboard_points: default_dashboard_points(),
            thresholds: Thresholds::default(),
            auto_recovery: default_auto_recovery(),
            recovery_timeout_secs: default_recovery_timeout(),
            source: None,
            probe: None,
            alerts: Vec::new(),
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.monitoring_interval)
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }

    pub fn validate(&self) -> MonitorResult<()> {
        if self.monitoring_interval == 0 {
            return Err(MonitorError::InvalidConfig(
                "monitoring_interval must be at least one second".to_string(),
            ));
        }

        for (name, value) in [
            ("history_capacity", self.history_capacity),
            ("alert_history_capacity", self.alert_history_capacity),
            ("dashboard_points", self.dashboard_points),
        ] {
            if value == 0 {
                return Err(MonitorError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        if let Some((key, _)) = self.thresholds.iter().find(|(_, value)| !value.is_finite()) {
            return Err(MonitorError::InvalidConfig(format!(
                "threshold {key} is not a finite number"
            )));
        }

        Ok(())
    }
}

fn default_interval() -> u64 {
    30
}

fn default_history_capacity() -> usize {
    1000
}

fn default_alert_history_capacity() -> usize {
    500
}

fn default_dashboard_points() -> usize {
    100
}

fn default_auto_recovery() -> bool {
    true
}

fn default_recovery_timeout() -> u64 {
    5
}

/// Read a configuration file, TOML when the extension says so and JSON otherwise
pub fn read_config_file(path: impl AsRef<Path>) -> MonitorResult<MonitorConfig> {
    let path = path.as_ref();
    let file_content = std::fs::read_to_string(path)?;

    let config: MonitorConfig = match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(&file_content)?,
        _ => serde_json::from_str(&file_content)?,
    };

    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}
