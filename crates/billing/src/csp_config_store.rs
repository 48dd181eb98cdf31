//! Seeding and refreshing the operator-visible [`CspConfig`] document.

use std::collections::HashMap;

use billing_adapter_shared::config::Config;
use billing_adapter_shared::time_util::{get_date_delta, midnight_utc, now_utc};
use billing_adapter_shared::types::CspConfig;

/// Expiry window, in seconds, granted past `timestamp` before the
/// status document is considered stale. Matches the reference
/// implementation's use of the reporting cadence as the staleness
/// bound: a config believed current can be at most one reporting
/// interval old.
fn expiry_window_secs(config: &Config) -> i64 {
    config.reporting_interval as i64
}

/// Seed a fresh status document at adapter start: access presumed ok
/// until proven otherwise, archive location supplied by the archive
/// plugin, account info and plugin versions copied in verbatim, no
/// usage recorded yet. `expire` is `now + reporting_interval` in
/// periodic mode, or the contract's `end_of_support` in fixed mode.
pub fn create(
    config: &Config,
    account_info: serde_json::Value,
    archive_location: String,
    versions: HashMap<String, String>,
) -> CspConfig {
    let now = now_utc();
    let expire = if config.is_fixed_mode() {
        config
            .end_of_support
            .map(midnight_utc)
            .unwrap_or_else(|| get_date_delta(now, expiry_window_secs(config)))
    } else {
        get_date_delta(now, expiry_window_secs(config))
    };

    CspConfig {
        billing_api_access_ok: true,
        timestamp: now,
        expire,
        customer_csp_data: Some(account_info),
        archive_location,
        customer_billing_id: std::env::var(
            billing_adapter_shared::config::CUSTOMER_BILLING_ID_ENV,
        )
        .ok(),
        errors: Vec::new(),
        usage: None,
        last_billed: None,
        base_product: None,
        versions: Some(versions),
    }
}

/// Record a successful metering submission: access confirmed ok,
/// error list cleared, usage and last-billed timestamp recorded.
pub fn record_billing_success(
    csp_config: &mut CspConfig,
    usage: std::collections::HashMap<String, i64>,
    billed_at: time::OffsetDateTime,
) {
    csp_config.billing_api_access_ok = true;
    csp_config.errors.clear();
    csp_config.usage = Some(usage);
    csp_config.last_billed = Some(billing_adapter_shared::time_util::date_to_string(billed_at));
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_adapter_shared::config::{BillingInterval, LoggingConfig};
    use std::collections::HashMap;

    fn config() -> Config {
        Config {
            billing_interval: BillingInterval::Hourly,
            reporting_interval: 300,
            query_interval: 60,
            usage_metrics: HashMap::new(),
            billing_dates: None,
            end_of_support: None,
            archive_retention_period: 6,
            archive_bytes_limit: 0,
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn create_seeds_ok_access_and_empty_errors() {
        let csp_config = create(&config(), serde_json::json!({}), "memory://archive".to_string(), HashMap::new());
        assert!(csp_config.billing_api_access_ok);
        assert!(csp_config.errors.is_empty());
        assert!(csp_config.expire > csp_config.timestamp);
        assert_eq!(csp_config.archive_location, "memory://archive");
    }

    #[test]
    fn success_clears_prior_errors() {
        let mut csp_config = create(&config(), serde_json::json!({}), "memory://archive".to_string(), HashMap::new());
        csp_config.errors.push("prior failure".to_string());
        csp_config.billing_api_access_ok = false;

        let mut usage = HashMap::new();
        usage.insert("managed_node_count".to_string(), 5);
        record_billing_success(&mut csp_config, usage, now_utc());

        assert!(csp_config.billing_api_access_ok);
        assert!(csp_config.errors.is_empty());
        assert!(csp_config.last_billed.is_some());
    }

    #[test]
    fn create_copies_account_info_and_versions() {
        let mut versions = HashMap::new();
        versions.insert("adapter".to_string(), "1.0.0".to_string());
        let csp_config = create(
            &config(),
            serde_json::json!({"account_id": "acct-1"}),
            "memory://archive".to_string(),
            versions,
        );
        assert_eq!(csp_config.customer_csp_data.unwrap()["account_id"], "acct-1");
        assert_eq!(csp_config.versions.unwrap()["adapter"], "1.0.0");
    }

    #[test]
    fn fixed_mode_expires_at_end_of_support() {
        use billing_adapter_shared::time_util::midnight_utc;
        use time::macros::date;

        let mut fixed = config();
        fixed.billing_interval = BillingInterval::Fixed;
        fixed.end_of_support = Some(date!(2030 - 01 - 01));

        let csp_config = create(&fixed, serde_json::json!({}), "memory://archive".to_string(), HashMap::new());
        assert_eq!(csp_config.expire, midnight_utc(date!(2030 - 01 - 01)));
    }
}
