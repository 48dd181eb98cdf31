//! Common types, configuration model, and errors shared across the
//! billing adapter's core engine and its plugin implementations.

pub mod config;
pub mod error;
pub mod time_util;
pub mod types;

pub use config::{
    BillingInterval, Config, ConsumptionReporting, DimensionConfig, MetricConfig,
    UsageAggregation,
};
pub use error::{AdapterError, AdapterResult};
pub use types::{
    ArchiveEntry, BilledDimensionStatus, Cache, CspConfig, DimensionStatus, LastBill, UsageRecord,
};
