//! Document-shaped state, expressed as tagged structs instead of open
//! mappings. Optional fields are `Option<T>`; the shallow-merge
//! `update(replace=false)` semantics storage plugins need are provided
//! by [`merge_present_fields`], which patches in only the keys a caller
//! actually set.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

/// A single sample of usage, as produced by the product usage source.
/// Immutable once appended to [`Cache::usage_records`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    #[serde(with = "time::serde::rfc3339")]
    pub reporting_time: OffsetDateTime,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_product: Option<String>,

    /// The metric → quantity bag. Open-ended by design: which metrics
    /// appear is driven by `Config::usage_metrics`, not by this type.
    #[serde(flatten)]
    pub metrics: HashMap<String, i64>,
}

impl UsageRecord {
    pub fn new(reporting_time: OffsetDateTime, metrics: HashMap<String, i64>) -> Self {
        Self {
            reporting_time,
            base_product: None,
            metrics,
        }
    }

    /// Value for `metric`, or `0` if the record doesn't carry it.
    pub fn metric(&self, metric: &str) -> i64 {
        self.metrics.get(metric).copied().unwrap_or(0)
    }
}

/// Per-dimension outcome of a metering submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionStatus {
    /// Submitted this cycle and awaiting confirmation (legacy-string
    /// responses are normalized straight to `Succeeded`).
    Submitted,
    Succeeded,
    Failed,
}

/// The CSP's verdict for one billing dimension within a metering call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BilledDimensionStatus {
    pub status: DimensionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BilledDimensionStatus {
    pub fn succeeded(record_id: impl Into<String>) -> Self {
        Self {
            status: DimensionStatus::Succeeded,
            record_id: Some(record_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: DimensionStatus::Failed,
            record_id: None,
            error: Some(error.into()),
        }
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self.status, DimensionStatus::Succeeded)
    }
}

/// Summary of the most recently submitted bill, written by
/// `cache_meter_record`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LastBill {
    pub dimensions: HashMap<String, i64>,
    pub billing_status: HashMap<String, BilledDimensionStatus>,
    pub metering_time: String,
}

/// The persistent cache document: usage-record buffer plus billing
/// cursors. Mirrored in memory by the core and written back through
/// the storage hooks after every tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cache {
    #[serde(with = "time::serde::rfc3339")]
    pub adapter_start_time: OffsetDateTime,

    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub next_bill_time: Option<OffsetDateTime>,

    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub next_reporting_time: Option<OffsetDateTime>,

    pub usage_records: Vec<UsageRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_bill: Option<LastBill>,

    /// Present only while a previous metering attempt partially failed;
    /// its presence tells `get_billing_dimensions` which dimensions to
    /// skip on the next attempt. Deliberately serialized even when
    /// `None` (unlike this struct's other optional fields): a
    /// full-success tick clears it back to `None`, and that clearing
    /// must survive a `replace=false` merge as an explicit `null`
    /// overwrite rather than vanish as an omitted, untouched key.
    #[serde(default)]
    pub billing_status: Option<HashMap<String, BilledDimensionStatus>>,

    pub trial_remaining: u8,

    // Fixed-mode fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_billing_dates: Option<Vec<Date>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configured_billing_dates: Option<Vec<Date>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_of_support: Option<Date>,
}

/// The operator-visible status document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CspConfig {
    pub billing_api_access_ok: bool,

    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub expire: OffsetDateTime,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_csp_data: Option<serde_json::Value>,

    pub archive_location: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_billing_id: Option<String>,

    /// Rewritten in full every tick; never accumulated across ticks.
    pub errors: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<HashMap<String, i64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_billed: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_product: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versions: Option<HashMap<String, String>>,
}

/// One entry in the rolling metering archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub billing_time: String,
    pub billing_status: HashMap<String, BilledDimensionStatus>,
    pub billed_usage: HashMap<String, i64>,
    pub usage_records: Vec<UsageRecord>,
}

/// Shallow-merge `patch` into `base`, touching only the keys `patch`
/// actually carries. A key `patch` omits entirely (the common case: a
/// field with `skip_serializing_if = "Option::is_none"` that's `None`)
/// leaves `base`'s value untouched. A key `patch` carries with an
/// explicit JSON `null` overwrites `base`'s value to `null` — this is
/// how a field that deliberately always serializes (even when `None`,
/// e.g. [`Cache::billing_status`]) gets cleared through a
/// `replace=false` update instead of silently surviving it. Nested
/// objects merge recursively; any other value type in `patch` simply
/// replaces the corresponding value in `base`. This is what the
/// reference in-memory storage plugins use to implement
/// `update(replace=false)`.
pub fn merge_present_fields(base: serde_json::Value, patch: serde_json::Value) -> serde_json::Value {
    match (base, patch) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                if value.is_null() {
                    base_map.insert(key, serde_json::Value::Null);
                    continue;
                }
                let merged = match base_map.remove(&key) {
                    Some(existing) => merge_present_fields(existing, value),
                    None => value,
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, patch) => patch,
    }
}
