//! Plugin capability traits.
//!
//! The reference implementation discovers CSP, storage, and archive
//! backends as `pluggy` hook implementations collected by a reflective
//! plugin manager. Rust has no equivalent runtime plugin discovery, so
//! each hook group becomes an `async_trait` object-safe trait, and a
//! [`PluginSet`] stands in for the plugin manager: one boxed
//! implementation per group, wired up explicitly at startup instead of
//! discovered by entry points.

use std::collections::HashMap;

use async_trait::async_trait;
use billing_adapter_shared::config::Config;
use billing_adapter_shared::error::AdapterResult;
use billing_adapter_shared::types::{ArchiveEntry, BilledDimensionStatus, Cache, CspConfig, UsageRecord};
use time::OffsetDateTime;

/// The CSP metering API's response to a `meter_billing` call: either a
/// per-dimension status map (the canonical shape, capable of expressing
/// a partial success where some dimensions succeeded and others carry
/// an error) or a single opaque string (the legacy shape some CSPs
/// still return, always a full success). Both are normalized to this
/// enum rather than threading a `serde_json::Value` through the engine.
#[derive(Debug, Clone)]
pub enum MeterBillingResponse {
    /// One `{status, record_id?, error?}` outcome per billed dimension.
    PerDimension(HashMap<String, BilledDimensionStatus>),
    /// A single record id covering every billed dimension in the call,
    /// all treated as succeeded.
    Legacy(String),
}

impl MeterBillingResponse {
    /// Normalize to a per-dimension status map: a legacy response is
    /// treated as if it billed every dimension in `billed` with the
    /// same record id, all succeeded.
    pub fn into_per_dimension(self, billed: &[String]) -> HashMap<String, BilledDimensionStatus> {
        match self {
            MeterBillingResponse::PerDimension(map) => map,
            MeterBillingResponse::Legacy(id) => billed
                .iter()
                .map(|d| (d.clone(), BilledDimensionStatus::succeeded(id.clone())))
                .collect(),
        }
    }
}

/// Account/CSP identity and the metering submission itself.
#[async_trait]
pub trait CspHooks: Send + Sync {
    /// One-time setup invoked at adapter start (credential checks,
    /// client construction). Called again on restart; must be
    /// idempotent.
    async fn setup_adapter(&self, config: &Config) -> AdapterResult<()>;

    /// CSP-specific config defaults, merged under the user's YAML
    /// document at load time (user values win).
    fn load_defaults(&self) -> serde_yaml::Value {
        serde_yaml::Value::Null
    }

    fn csp_name(&self) -> &str;

    async fn account_info(&self, config: &Config) -> AdapterResult<serde_json::Value>;

    /// `(name, version)` of this CSP plugin, recorded into
    /// `CspConfig::versions` at bootstrap.
    fn version(&self) -> (String, String);

    /// Submit `dimensions` for the billing period ending at `timestamp`.
    /// `dry_run` exercises the call without side effects, used by the
    /// startup metering test.
    async fn meter_billing(
        &self,
        config: &Config,
        dimensions: &HashMap<String, i64>,
        timestamp: OffsetDateTime,
        billing_period_start: OffsetDateTime,
        billing_period_end: OffsetDateTime,
        dry_run: bool,
    ) -> AdapterResult<MeterBillingResponse>;
}

/// The product's own usage signal. `None` means no sample is available
/// this tick (not an error): the event loop simply skips the append.
#[async_trait]
pub trait UsageHooks: Send + Sync {
    async fn get_usage_data(&self, config: &Config) -> AdapterResult<Option<UsageRecord>>;
}

/// Persistent state: the billing cursor cache and the operator-visible
/// status document. `update_*` performs a shallow merge unless
/// `replace` is set, matching the reference implementation's
/// `update(..., replace=False)` default.
#[async_trait]
pub trait StorageHooks: Send + Sync {
    async fn get_cache(&self, config: &Config) -> AdapterResult<Option<Cache>>;
    async fn save_cache(&self, config: &Config, cache: &Cache) -> AdapterResult<()>;
    async fn update_cache(&self, config: &Config, cache: &Cache, replace: bool) -> AdapterResult<()>;

    async fn get_csp_config(&self, config: &Config) -> AdapterResult<Option<CspConfig>>;
    async fn save_csp_config(&self, config: &Config, csp_config: &CspConfig) -> AdapterResult<()>;
    async fn update_csp_config(
        &self,
        config: &Config,
        csp_config: &CspConfig,
        replace: bool,
    ) -> AdapterResult<()>;
}

/// The rolling metering-history archive.
#[async_trait]
pub trait ArchiveHooks: Send + Sync {
    fn archive_location(&self) -> String;
    async fn get_metering_archive(&self, config: &Config) -> AdapterResult<Vec<ArchiveEntry>>;
    async fn save_metering_archive(
        &self,
        config: &Config,
        archive: &[ArchiveEntry],
    ) -> AdapterResult<()>;
}

/// The full set of backends the event loop drives, wired up at
/// startup in place of the reference implementation's reflective
/// plugin discovery.
pub struct PluginSet {
    pub csp: Box<dyn CspHooks>,
    pub usage: Box<dyn UsageHooks>,
    pub storage: Box<dyn StorageHooks>,
    pub archive: Box<dyn ArchiveHooks>,
}

impl PluginSet {
    pub fn new(
        csp: Box<dyn CspHooks>,
        usage: Box<dyn UsageHooks>,
        storage: Box<dyn StorageHooks>,
        archive: Box<dyn ArchiveHooks>,
    ) -> Self {
        Self {
            csp,
            usage,
            storage,
            archive,
        }
    }
}
