//! Error types for the CSP billing adapter core.

use thiserror::Error;

/// Errors the billing state engine can raise.
///
/// Each variant maps to a policy in the event loop: some are fatal
/// (exit code 2), some are recorded into `CspConfig::errors` and the
/// tick continues.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("no matching volume dimension found for {metric:?}={value}")]
    NoMatchingVolumeDimension { metric: String, value: i64 },

    #[error("usage {value} for metric {metric:?} was not fully assigned to tiered dimensions")]
    MissingTieredDimension { metric: String, value: i64 },

    #[error("consumption_reporting {model:?} is not a recognized reporting model for metric {metric:?}")]
    ConsumptionReportingInvalid { metric: String, model: String },

    #[error("failed to save cache: {0}")]
    FailedToSaveCache(String),

    #[error("failed to save csp_config: {0}")]
    FailedToSaveCspConfig(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("CSP metering call failed: {0}")]
    MeteringFailed(String),

    #[error("storage operation failed: {0}")]
    Storage(String),

    #[error("usage source failed: {0}")]
    UsageSource(String),
}

pub type AdapterResult<T> = Result<T, AdapterError>;
