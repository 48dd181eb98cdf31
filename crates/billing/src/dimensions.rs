//! Aggregation and consumption-reporting translation: raw usage
//! samples in, billable per-metric quantities out, billing dimensions
//! out of those.

use std::collections::HashMap;

use billing_adapter_shared::config::{Config, ConsumptionReporting, UsageAggregation};
use billing_adapter_shared::error::{AdapterError, AdapterResult};
use billing_adapter_shared::types::{BilledDimensionStatus, UsageRecord};
use time::OffsetDateTime;

use billing_adapter_shared::time_util::get_prev_bill_time;

fn max_usage(metric: &str, records: &[UsageRecord]) -> i64 {
    records.iter().map(|r| r.metric(metric)).max().unwrap_or(0)
}

fn average_usage(metric: &str, records: &[UsageRecord]) -> i64 {
    if records.is_empty() {
        return 0;
    }
    let total: i64 = records.iter().map(|r| r.metric(metric)).sum();
    // Ceiling division, matching math.ceil(total / len).
    let len = records.len() as i64;
    (total + len - 1) / len
}

/// Reduce `records` to one billable quantity per configured metric.
/// `empty_usage` forces every metric to `0`, used for reporting-only
/// (liveness) ticks that must not bill real consumption.
pub fn get_billable_usage(
    records: &[UsageRecord],
    config: &Config,
    empty_usage: bool,
) -> HashMap<String, i64> {
    if empty_usage {
        return config.usage_metrics.keys().map(|m| (m.clone(), 0)).collect();
    }

    config
        .usage_metrics
        .iter()
        .map(|(metric, metric_config)| {
            let usage = match metric_config.usage_aggregation {
                UsageAggregation::Average => average_usage(metric, records),
                UsageAggregation::Maximum => max_usage(metric, records),
            };
            let billable = usage.max(metric_config.minimum_consumption.unwrap_or(0));
            (metric.clone(), billable)
        })
        .collect()
}

/// Select the subset of `records` whose `reporting_time` falls in the
/// billing period ending at `billing_period_end`.
pub fn filter_usage_records_in_billing_period(
    records: &[UsageRecord],
    config: &Config,
    billing_period_end: OffsetDateTime,
) -> (Vec<UsageRecord>, Vec<UsageRecord>) {
    let period_start = get_prev_bill_time(billing_period_end, config.billing_interval);

    records.iter().cloned().partition(|record| {
        record.reporting_time >= period_start && record.reporting_time < billing_period_end
    })
}

/// True if `dimension`'s previous submission this cycle already came
/// back `succeeded` — it must not be billed again.
fn already_succeeded(dimension: &str, billing_status: &HashMap<String, BilledDimensionStatus>) -> bool {
    billing_status.get(dimension).map(|s| s.is_succeeded()).unwrap_or(false)
}

/// First dimension (in config order) whose `[min, max]` contains
/// `usage` bills all of it. Exactly one dimension is emitted per metric,
/// and none at all if that dimension already succeeded this cycle.
fn volume_dimensions(
    metric: &str,
    usage: i64,
    dimensions: &[billing_adapter_shared::config::DimensionConfig],
    billing_status: &HashMap<String, BilledDimensionStatus>,
    billed: &mut HashMap<String, i64>,
) -> AdapterResult<()> {
    for dim in dimensions {
        if dim.contains(usage) {
            if !already_succeeded(&dim.dimension, billing_status) {
                billed.insert(dim.dimension.clone(), usage);
            }
            return Ok(());
        }
    }

    Err(AdapterError::NoMatchingVolumeDimension {
        metric: metric.to_string(),
        value: usage,
    })
}

/// Split `usage` across ordered tiers, each billed for the portion of
/// usage overlapping its `[min, max]` range, using inclusive-range
/// counting. Fails if any usage is left unassigned after the last tier.
/// A tier whose dimension already succeeded this cycle is excluded from
/// the result but still counts toward full coverage of `usage`.
fn tiered_dimensions(
    metric: &str,
    usage: i64,
    dimensions: &[billing_adapter_shared::config::DimensionConfig],
    billing_status: &HashMap<String, BilledDimensionStatus>,
    billed: &mut HashMap<String, i64>,
) -> AdapterResult<()> {
    let mut assigned: i64 = 0;

    for dim in dimensions {
        let min = dim.min.unwrap_or(1).max(1);
        if usage < min {
            continue;
        }

        let max = dim.max.unwrap_or(usage);
        let dim_usage = usage.min(max) - min + 1;
        if dim_usage <= 0 {
            continue;
        }

        assigned += dim_usage;

        if !already_succeeded(&dim.dimension, billing_status) {
            billed.insert(dim.dimension.clone(), dim_usage);
        }
    }

    if assigned < usage {
        return Err(AdapterError::MissingTieredDimension {
            metric: metric.to_string(),
            value: usage,
        });
    }

    Ok(())
}

/// Translate `billable_usage` into billing dimensions, skipping any
/// dimension that already carries a `succeeded` status from a prior
/// attempt this cycle. The skip is applied at dimension granularity,
/// not metric granularity: a tiered metric with one succeeded tier and
/// one failed tier still re-submits the failed tier alone.
pub fn get_billing_dimensions(
    config: &Config,
    billable_usage: &HashMap<String, i64>,
    billing_status: &HashMap<String, BilledDimensionStatus>,
) -> AdapterResult<HashMap<String, i64>> {
    let mut billed = HashMap::new();

    for (metric, &usage) in billable_usage {
        let Some(metric_config) = config.usage_metrics.get(metric) else {
            continue;
        };

        match metric_config.consumption_reporting {
            ConsumptionReporting::Volume => {
                volume_dimensions(metric, usage, &metric_config.dimensions, billing_status, &mut billed)?;
            }
            ConsumptionReporting::Tiered => {
                tiered_dimensions(metric, usage, &metric_config.dimensions, billing_status, &mut billed)?;
            }
        }
    }

    Ok(billed)
}
