//! The billing state engine: usage aggregation, consumption-reporting
//! translation, metering submission, retry, and the archive, plus the
//! plugin trait surface the event loop drives them through.

pub mod archive;
pub mod cache;
pub mod csp_config_store;
pub mod dimensions;
pub mod engine;
pub mod hooks;
pub mod retry;

pub use dimensions::{filter_usage_records_in_billing_period, get_billable_usage, get_billing_dimensions};
pub use engine::process_metering;
pub use hooks::{ArchiveHooks, CspHooks, MeterBillingResponse, PluginSet, StorageHooks, UsageHooks};
pub use retry::{retry, RetryConfig};
