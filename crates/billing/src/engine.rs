//! The metering engine: drives one full metering attempt per tick,
//! from aggregation through CSP submission to cache/status mutation.
//!
//! Crash recovery note: if the process dies between a successful
//! `meter_billing` call and the cache write that drops the billed
//! records, the same usage is metered again on restart. This
//! implementation accepts at-least-once metering rather than adding an
//! idempotency token scheme the reference implementation never had.

use std::collections::HashMap;

use billing_adapter_shared::config::Config;
use billing_adapter_shared::error::AdapterResult;
use billing_adapter_shared::time_util::{date_to_string, get_next_bill_time};
use billing_adapter_shared::types::{BilledDimensionStatus, Cache, CspConfig};
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::archive;
use crate::cache as cache_store;
use crate::csp_config_store;
use crate::dimensions::{filter_usage_records_in_billing_period, get_billable_usage, get_billing_dimensions};
use crate::hooks::{ArchiveHooks, CspHooks, MeterBillingResponse};
use crate::retry::{retry, RetryConfig};

/// Drive one full metering attempt. `empty_metering` is set for
/// reporting-only (liveness) ticks, which submit zeroed usage and
/// never touch `usage_records` or the billing cursor even on success.
pub async fn process_metering(
    csp: &dyn CspHooks,
    archive_hooks: &dyn ArchiveHooks,
    config: &Config,
    now: OffsetDateTime,
    cache: &mut Cache,
    csp_config: &mut CspConfig,
    empty_metering: bool,
) -> AdapterResult<()> {
    // 1. Split usage_records into billable (in-window) and remaining.
    let billing_period_end = cache.next_bill_time.unwrap_or(now);
    let (billable, remaining) =
        filter_usage_records_in_billing_period(&cache.usage_records, config, billing_period_end);

    // 2. Compute the billable quantity per metric.
    let billable_usage = get_billable_usage(&billable, config, empty_metering);

    // 3. Translate into billing dimensions, skipping already-succeeded ones.
    let billing_status_so_far = cache.billing_status.clone().unwrap_or_default();
    let billed_dimensions = get_billing_dimensions(config, &billable_usage, &billing_status_so_far)?;

    let billing_period_start =
        billing_adapter_shared::time_util::get_prev_bill_time(billing_period_end, config.billing_interval);

    // 4. Invoke the CSP, retried, and normalize its response.
    let dimension_names: Vec<String> = billed_dimensions.keys().cloned().collect();
    let outcome = retry("csp.meter_billing", RetryConfig::default(), || {
        csp.meter_billing(
            config,
            &billed_dimensions,
            now,
            billing_period_start,
            billing_period_end,
            false,
        )
    })
    .await;

    let status = match outcome {
        Err(e) => {
            // 6. Fail path: record the failure, do not advance anything.
            warn!(error = %e, "metering call failed");
            csp_config.errors.push(e.to_string());
            csp_config.billing_api_access_ok = false;
            return Ok(());
        }
        Ok(response) => response.into_per_dimension(&dimension_names),
    };

    // 5. Collect errors carried in the per-dimension status.
    let errors: Vec<String> = status
        .values()
        .filter_map(|s| s.error.clone())
        .collect();

    if !errors.is_empty() {
        // 7. Partial-success path: remember what succeeded, don't advance.
        csp_config.errors.extend(errors);
        csp_config.billing_api_access_ok = false;
        cache.billing_status = Some(status);
        return Ok(());
    }

    // 8. Full-success path.
    cache.billing_status = None;
    csp_config.billing_api_access_ok = true;

    // Fixed mode has no reporting cadence of its own: `next_reporting_time`
    // stays `None` and `expire` stays pinned to `end_of_support` rather
    // than being reset from a `reporting_interval` that doesn't apply.
    if !config.is_fixed_mode() {
        let next_reporting_time = now + std::time::Duration::from_secs(config.reporting_interval);
        cache.next_reporting_time = Some(next_reporting_time);
        csp_config.expire = next_reporting_time;
    }

    if !empty_metering {
        let next_bill_time = if config.is_fixed_mode() {
            cache_store::update_billing_dates(cache);
            cache.next_bill_time
        } else {
            Some(get_next_bill_time(
                cache.next_bill_time.unwrap_or(now),
                config.billing_interval,
            ))
        };

        cache_store::cache_meter_record(
            cache,
            billed_dimensions.clone(),
            status.clone(),
            date_to_string(now),
        );
        cache.usage_records = remaining;
        cache.next_bill_time = next_bill_time;
        // The one-time free trial ends at the first real bill.
        cache.trial_remaining = 0;

        csp_config_store::record_billing_success(csp_config, billable_usage.clone(), now);

        let entry = billing_adapter_shared::types::ArchiveEntry {
            billing_time: date_to_string(now),
            billing_status: status,
            billed_usage: billed_dimensions,
            usage_records: billable,
        };
        archive_append(archive_hooks, config, entry).await?;

        info!(dims = ?csp_config.usage, "metering cycle completed");
    }

    Ok(())
}

async fn archive_append(
    archive_hooks: &dyn ArchiveHooks,
    config: &Config,
    entry: billing_adapter_shared::types::ArchiveEntry,
) -> AdapterResult<()> {
    let existing = retry("archive.get_metering_archive", RetryConfig::default(), || {
        archive_hooks.get_metering_archive(config)
    })
    .await?;

    let updated = archive::append_metering_records(
        existing,
        entry,
        config.archive_retention_period,
        config.archive_bytes_limit,
    );

    retry("archive.save_metering_archive", RetryConfig::default(), || {
        archive_hooks.save_metering_archive(config, &updated)
    })
    .await
}
