//! Typed configuration model.
//!
//! The adapter reads a YAML document, merges it over plugin-supplied
//! defaults (user values win, matching the reference implementation's
//! `{**defaults, **user}` shallow-merge semantics), and exposes the
//! result as this typed `Config` rather than an open mapping.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::Date;

use crate::error::{AdapterError, AdapterResult};

/// Env var that overrides the default config file path.
pub const CONFIG_FILE_ENV: &str = "CSP_ADAPTER_CONFIG_FILE";

/// Env var that, in fixed-billing mode, seeds `CspConfig::customer_billing_id`.
pub const CUSTOMER_BILLING_ID_ENV: &str = "CUSTOMER_BILLING_ID";

const DEFAULT_CONFIG_PATH: &str = "/etc/csp_billing_adapter/config.yaml";

/// Cadence at which real (non-zero) usage is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Hourly,
    Daily,
    Monthly,
    Test,
    Fixed,
}

/// How a metric's samples are reduced to a single billable quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageAggregation {
    Average,
    Maximum,
}

/// Whether all usage bills to one matching tier (`volume`) or is split
/// across ordered tiers (`tiered`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumptionReporting {
    Volume,
    Tiered,
}

/// One billing-dimension bucket within a metric's `dimensions` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionConfig {
    pub dimension: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
}

impl DimensionConfig {
    /// Whether `usage` falls within this dimension's inclusive `[min, max]`
    /// range. A missing bound is treated as unbounded on that side.
    pub fn contains(&self, usage: i64) -> bool {
        if let Some(min) = self.min {
            if usage < min {
                return false;
            }
        }
        if let Some(max) = self.max {
            if usage > max {
                return false;
            }
        }
        true
    }
}

/// Per-metric billing configuration: how to aggregate samples and how
/// to translate the aggregate into billing dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricConfig {
    pub usage_aggregation: UsageAggregation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_consumption: Option<i64>,
    pub consumption_reporting: ConsumptionReporting,
    pub dimensions: Vec<DimensionConfig>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_archive_retention_period() -> usize {
    6
}

fn default_archive_bytes_limit() -> usize {
    0
}

/// The adapter's fully loaded, read-only configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub billing_interval: BillingInterval,
    pub reporting_interval: u64,
    pub query_interval: u64,
    pub usage_metrics: HashMap<String, MetricConfig>,

    /// Fixed-mode only: ascending list of scheduled billing dates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_dates: Option<Vec<Date>>,

    /// Fixed-mode only: terminal date after which the contract ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_of_support: Option<Date>,

    #[serde(default = "default_archive_retention_period")]
    pub archive_retention_period: usize,

    #[serde(default = "default_archive_bytes_limit")]
    pub archive_bytes_limit: usize,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// True when the configuration uses an explicit date list rather
    /// than a periodic cadence.
    pub fn is_fixed_mode(&self) -> bool {
        self.billing_interval == BillingInterval::Fixed
    }

    /// Validate the parts of the config that are only meaningful once
    /// we know which metric/dimension the metering test will exercise.
    /// Mirrors the original's lazy validation: a config file can parse
    /// fine and still be "invalid" in this sense.
    pub fn first_metric_and_dimension(&self) -> AdapterResult<(&str, &DimensionConfig)> {
        let (metric_name, metric) = self
            .usage_metrics
            .iter()
            .min_by_key(|(name, _)| name.to_string())
            .ok_or_else(|| {
                AdapterError::InvalidConfig("usage_metrics is empty or missing".to_string())
            })?;

        let dimension = metric.dimensions.first().ok_or_else(|| {
            AdapterError::InvalidConfig(format!(
                "metric {metric_name:?} has no configured dimensions"
            ))
        })?;

        Ok((metric_name.as_str(), dimension))
    }

    /// Resolve the config file path: `CSP_ADAPTER_CONFIG_FILE` env var
    /// if set, otherwise the conventional system path.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        env::var(CONFIG_FILE_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Merge plugin-supplied defaults under a user-supplied YAML
    /// document (user keys win) and deserialize the result.
    pub fn from_yaml_with_defaults(
        user_yaml: &str,
        defaults: serde_yaml::Value,
    ) -> AdapterResult<Config> {
        let user: serde_yaml::Value = serde_yaml::from_str(user_yaml)
            .map_err(|e| AdapterError::InvalidConfig(format!("invalid config YAML: {e}")))?;

        let merged = merge_user_over_defaults(defaults, user);

        serde_yaml::from_value(merged)
            .map_err(|e| AdapterError::InvalidConfig(format!("config does not match schema: {e}")))
    }

    /// Load from disk (or env-overridden path), merging over `defaults`.
    pub fn load_from_file(path: &Path, defaults: serde_yaml::Value) -> AdapterResult<Config> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AdapterError::InvalidConfig(format!("cannot read {path:?}: {e}")))?;
        Self::from_yaml_with_defaults(&contents, defaults)
    }
}

/// Shallow merge: every top-level key in `user` overwrites the same key
/// in `defaults`; keys present only in `defaults` survive untouched.
/// Matches the reference implementation's `{**defaults, **data}`.
fn merge_user_over_defaults(
    defaults: serde_yaml::Value,
    user: serde_yaml::Value,
) -> serde_yaml::Value {
    match (defaults, user) {
        (serde_yaml::Value::Mapping(mut base), serde_yaml::Value::Mapping(overrides)) => {
            for (k, v) in overrides {
                base.insert(k, v);
            }
            serde_yaml::Value::Mapping(base)
        }
        (_, user) => user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
billing_interval: hourly
reporting_interval: 3600
query_interval: 300
usage_metrics:
  managed_node_count:
    usage_aggregation: average
    consumption_reporting: volume
    dimensions:
      - dimension: tier_1
        min: 0
        max: 100
"#
    }

    #[test]
    fn user_values_win_over_defaults() {
        let defaults: serde_yaml::Value = serde_yaml::from_str(
            "archive_retention_period: 2\narchive_bytes_limit: 999\n",
        )
        .unwrap();

        let config = Config::from_yaml_with_defaults(sample_yaml(), defaults).unwrap();
        // archive_retention_period/bytes_limit come only from defaults here.
        assert_eq!(config.archive_retention_period, 2);
        assert_eq!(config.archive_bytes_limit, 999);
        assert_eq!(config.billing_interval, BillingInterval::Hourly);
    }

    #[test]
    fn user_key_overrides_default_key() {
        let defaults: serde_yaml::Value =
            serde_yaml::from_str("reporting_interval: 1\n").unwrap();

        let config = Config::from_yaml_with_defaults(sample_yaml(), defaults).unwrap();
        assert_eq!(config.reporting_interval, 3600);
    }

    #[test]
    fn missing_usage_metrics_is_invalid_config() {
        let defaults = serde_yaml::Value::Null;
        let yaml = "billing_interval: hourly\nreporting_interval: 60\nquery_interval: 30\nusage_metrics: {}\n";
        let config = Config::from_yaml_with_defaults(yaml, defaults).unwrap();
        assert!(config.first_metric_and_dimension().is_err());
    }

    #[test]
    fn defaults_missing_archive_fields_use_struct_defaults() {
        let defaults = serde_yaml::Value::Null;
        let config = Config::from_yaml_with_defaults(sample_yaml(), defaults).unwrap();
        assert_eq!(config.archive_retention_period, 6);
        assert_eq!(config.archive_bytes_limit, 0);
    }
}
