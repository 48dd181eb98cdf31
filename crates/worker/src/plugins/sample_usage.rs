//! Reference [`UsageHooks`] implementation: synthesizes a usage sample
//! on every call instead of reading the product's real runtime
//! telemetry, which is an external collaborator per the core's scope.
//! Useful for bootstrapping the adapter and for exercising the event
//! loop without a product API to query.

use std::collections::HashMap;

use async_trait::async_trait;
use billing_adapter_core::hooks::UsageHooks;
use billing_adapter_shared::config::Config;
use billing_adapter_shared::error::AdapterResult;
use billing_adapter_shared::time_util::now_utc;
use billing_adapter_shared::types::UsageRecord;
use rand::Rng;

pub struct SampleUsageSource {
    base_product: String,
}

impl SampleUsageSource {
    pub fn new(base_product: impl Into<String>) -> Self {
        Self {
            base_product: base_product.into(),
        }
    }
}

impl Default for SampleUsageSource {
    fn default() -> Self {
        Self::new("csp-billing-adapter-demo")
    }
}

#[async_trait]
impl UsageHooks for SampleUsageSource {
    async fn get_usage_data(&self, config: &Config) -> AdapterResult<Option<UsageRecord>> {
        let mut rng = rand::thread_rng();
        let metrics: HashMap<String, i64> = config
            .usage_metrics
            .keys()
            .map(|metric| (metric.clone(), rng.gen_range(1..=20)))
            .collect();

        let mut record = UsageRecord::new(now_utc(), metrics);
        record.base_product = Some(self.base_product.clone());
        Ok(Some(record))
    }
}
