//! Reference [`CspHooks`] implementation: a sandboxed CSP marketplace
//! that always accepts a submission. The actual HTTP/SDK calls a real
//! marketplace metering endpoint needs are the external collaborator
//! this core depends on (§6); this plugin stands in for that
//! collaborator so the adapter can boot and run a full cycle without a
//! live CSP account, the way the reference project's own in-memory
//! plugin does for its test suite.

use std::collections::HashMap;

use async_trait::async_trait;
use billing_adapter_core::hooks::{CspHooks, MeterBillingResponse};
use billing_adapter_shared::config::Config;
use billing_adapter_shared::error::AdapterResult;
use billing_adapter_shared::types::BilledDimensionStatus;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

pub struct DemoCsp {
    name: String,
}

impl DemoCsp {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for DemoCsp {
    fn default() -> Self {
        Self::new("demo-marketplace")
    }
}

#[async_trait]
impl CspHooks for DemoCsp {
    async fn setup_adapter(&self, _config: &Config) -> AdapterResult<()> {
        info!(csp = %self.name, "CSP adapter setup complete");
        Ok(())
    }

    fn load_defaults(&self) -> serde_yaml::Value {
        serde_yaml::from_str("archive_retention_period: 6\narchive_bytes_limit: 0\n")
            .unwrap_or(serde_yaml::Value::Null)
    }

    fn csp_name(&self) -> &str {
        &self.name
    }

    async fn account_info(&self, _config: &Config) -> AdapterResult<serde_json::Value> {
        Ok(serde_json::json!({
            "customer_id": "demo-customer",
            "product_code": "csp-billing-adapter-demo",
        }))
    }

    fn version(&self) -> (String, String) {
        (self.name.clone(), env!("CARGO_PKG_VERSION").to_string())
    }

    async fn meter_billing(
        &self,
        _config: &Config,
        dimensions: &HashMap<String, i64>,
        timestamp: OffsetDateTime,
        _billing_period_start: OffsetDateTime,
        _billing_period_end: OffsetDateTime,
        dry_run: bool,
    ) -> AdapterResult<MeterBillingResponse> {
        if dry_run {
            info!(csp = %self.name, dims = ?dimensions, "metering test (dry run)");
            return Ok(MeterBillingResponse::Legacy(Uuid::new_v4().to_string()));
        }

        info!(csp = %self.name, dims = ?dimensions, %timestamp, "submitting metered usage");

        let response = dimensions
            .keys()
            .map(|dim| (dim.clone(), BilledDimensionStatus::succeeded(Uuid::new_v4().to_string())))
            .collect::<HashMap<_, _>>();

        Ok(MeterBillingResponse::PerDimension(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn config() -> Config {
        Config {
            billing_interval: billing_adapter_shared::config::BillingInterval::Hourly,
            reporting_interval: 300,
            query_interval: 60,
            usage_metrics: HashMap::new(),
            billing_dates: None,
            end_of_support: None,
            archive_retention_period: 6,
            archive_bytes_limit: 0,
            logging: billing_adapter_shared::config::LoggingConfig::default(),
        }
    }

    #[tokio::test]
    async fn meter_billing_succeeds_for_every_dimension() {
        let csp = DemoCsp::default();
        let mut dims = HashMap::new();
        dims.insert("tier_1".to_string(), 5);

        let now = datetime!(2024-01-01 00:00:00 UTC);
        let response = csp
            .meter_billing(&config(), &dims, now, now, now, false)
            .await
            .unwrap();

        match response {
            MeterBillingResponse::PerDimension(map) => assert!(map.contains_key("tier_1")),
            MeterBillingResponse::Legacy(_) => panic!("expected per-dimension response"),
        }
    }

    #[tokio::test]
    async fn dry_run_never_touches_real_dimensions() {
        let csp = DemoCsp::default();
        let now = datetime!(2024-01-01 00:00:00 UTC);
        let response = csp
            .meter_billing(&config(), &HashMap::new(), now, now, now, true)
            .await
            .unwrap();

        assert!(matches!(response, MeterBillingResponse::Legacy(_)));
    }

    #[test]
    fn load_defaults_supplies_archive_bounds() {
        let csp = DemoCsp::default();
        let defaults = csp.load_defaults();
        assert_eq!(defaults["archive_retention_period"], 6);
    }
}
