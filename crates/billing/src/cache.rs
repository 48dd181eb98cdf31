//! In-memory bookkeeping for the persistent cache document: seeding a
//! fresh cache, validating and appending usage samples, and recording
//! the outcome of a metering submission. Persistence itself goes
//! through the storage hook; these functions only compute the next
//! `Cache` value. Cursor advancement and `usage_records` draining on a
//! full-success metering attempt are the engine's responsibility
//! (`engine::process_metering`), not this module's — `cache_meter_record`
//! only ever writes `last_bill`.

use std::collections::HashMap;

use billing_adapter_shared::config::Config;
use billing_adapter_shared::time_util::{get_next_bill_time, midnight_utc, now_utc};
use billing_adapter_shared::types::{BilledDimensionStatus, Cache, LastBill, UsageRecord};
use time::OffsetDateTime;

/// Seed a brand new cache at adapter start. `next_bill_time` is one
/// `billing_interval` out from now (or the first configured date in
/// fixed mode); `next_reporting_time` is one `reporting_interval` out,
/// independent of the billing cadence. Fixed mode has no reporting
/// cadence of its own, so `next_reporting_time` stays `None` there —
/// the only liveness signal fixed-mode customers get is a real bill.
pub fn create(config: &Config) -> Cache {
    let now = now_utc();

    let (next_bill_time, remaining_billing_dates, configured_billing_dates, next_reporting_time) =
        if config.is_fixed_mode() {
            let dates = config.billing_dates.clone().unwrap_or_default();
            let next = dates.first().map(|d| midnight_utc(*d));
            let remaining = if dates.is_empty() { Vec::new() } else { dates[1..].to_vec() };
            (next, Some(remaining), Some(dates), None)
        } else {
            (
                Some(get_next_bill_time(now, config.billing_interval)),
                None,
                None,
                Some(now + std::time::Duration::from_secs(config.reporting_interval)),
            )
        };

    Cache {
        adapter_start_time: now,
        next_bill_time,
        next_reporting_time,
        usage_records: Vec::new(),
        last_bill: None,
        billing_status: None,
        trial_remaining: if config.is_fixed_mode() { 0 } else { 1 },
        remaining_billing_dates,
        configured_billing_dates,
        end_of_support: config.end_of_support,
    }
}

/// Whether `reporting_time` belongs to the billing period ending at
/// `next_bill_time`: `prev_bill_time(next_bill_time, interval) <=
/// reporting_time`. Bypassed entirely in fixed mode, which has no
/// periodic notion of a billing window to validate against.
pub fn record_valid(
    reporting_time: OffsetDateTime,
    next_bill_time: OffsetDateTime,
    interval: billing_adapter_shared::config::BillingInterval,
) -> bool {
    if interval == billing_adapter_shared::config::BillingInterval::Fixed {
        return true;
    }
    billing_adapter_shared::time_util::get_prev_bill_time(next_bill_time, interval) <= reporting_time
}

/// Append one usage sample: reject it if it falls outside the current
/// billing window, suppress it if its `reporting_time` equals the most
/// recently appended record's (duplicate resubmission by the usage
/// source), append otherwise.
pub fn add_usage_record(cache: &mut Cache, config: &Config, record: UsageRecord) {
    if let Some(next_bill_time) = cache.next_bill_time {
        if !record_valid(record.reporting_time, next_bill_time, config.billing_interval) {
            return;
        }
    }

    if let Some(last) = cache.usage_records.last() {
        if last.reporting_time == record.reporting_time {
            return;
        }
    }

    cache.usage_records.push(record);
}

/// Write `last_bill` to reflect the outcome of a metering attempt.
/// Does not clear `usage_records` and does not advance any cursor —
/// the engine decides whether this attempt was a full success before
/// performing either of those.
pub fn cache_meter_record(
    cache: &mut Cache,
    dimensions: HashMap<String, i64>,
    billing_status: HashMap<String, BilledDimensionStatus>,
    metering_time: String,
) {
    cache.last_bill = Some(LastBill {
        dimensions,
        billing_status,
        metering_time,
    });
}

/// Fixed mode only: advance `next_bill_time` to the next scheduled date,
/// drawn from the front of `remaining_billing_dates` (which holds every
/// configured date strictly after the one just billed).
pub fn update_billing_dates(cache: &mut Cache) {
    if let Some(dates) = cache.remaining_billing_dates.as_mut() {
        cache.next_bill_time = if dates.is_empty() {
            None
        } else {
            Some(midnight_utc(dates.remove(0)))
        };
    }
}

/// Whether `cache` is due for a bill, given the current instant.
pub fn is_billing_due(cache: &Cache, now: OffsetDateTime) -> bool {
    cache.next_bill_time.map(|t| now >= t).unwrap_or(false)
}

/// Whether `cache` is due for a reporting-only (liveness) tick.
pub fn is_reporting_due(cache: &Cache, now: OffsetDateTime) -> bool {
    cache.next_reporting_time.map(|t| now >= t).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_adapter_shared::config::{BillingInterval, LoggingConfig};
    use billing_adapter_shared::types::DimensionStatus;
    use time::macros::datetime;

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
    fn create_sets_next_bill_time_one_interval_out() {
        let config = config();
        let cache = create(&config);
        assert!(cache.next_bill_time.unwrap() > cache.adapter_start_time);
        assert!(cache.usage_records.is_empty());
        assert!(cache.last_bill.is_none());
        assert_eq!(cache.trial_remaining, 1);
        assert!(cache.next_reporting_time.is_some());
    }

    #[test]
    fn fixed_mode_create_assigns_first_date_and_defers_the_rest() {
        use time::macros::date;

        let mut fixed = config();
        fixed.billing_interval = BillingInterval::Fixed;
        fixed.billing_dates = Some(vec![date!(2027 - 01 - 01), date!(2028 - 01 - 01), date!(2029 - 01 - 01)]);

        let cache = create(&fixed);

        assert_eq!(cache.next_bill_time, Some(midnight_utc(date!(2027 - 01 - 01))));
        assert_eq!(
            cache.remaining_billing_dates,
            Some(vec![date!(2028 - 01 - 01), date!(2029 - 01 - 01)])
        );
        assert_eq!(
            cache.configured_billing_dates,
            Some(vec![date!(2027 - 01 - 01), date!(2028 - 01 - 01), date!(2029 - 01 - 01)])
        );
        assert!(cache.next_reporting_time.is_none());
        assert_eq!(cache.trial_remaining, 0);
    }

    #[test]
    fn fixed_mode_update_billing_dates_advances_from_remaining() {
        use time::macros::date;

        let mut fixed = config();
        fixed.billing_interval = BillingInterval::Fixed;
        fixed.billing_dates = Some(vec![date!(2027 - 01 - 01), date!(2028 - 01 - 01), date!(2029 - 01 - 01)]);
        let mut cache = create(&fixed);

        update_billing_dates(&mut cache);
        assert_eq!(cache.next_bill_time, Some(midnight_utc(date!(2028 - 01 - 01))));
        assert_eq!(cache.remaining_billing_dates, Some(vec![date!(2029 - 01 - 01)]));

        update_billing_dates(&mut cache);
        assert_eq!(cache.next_bill_time, Some(midnight_utc(date!(2029 - 01 - 01))));
        assert_eq!(cache.remaining_billing_dates, Some(Vec::new()));

        update_billing_dates(&mut cache);
        assert_eq!(cache.next_bill_time, None);
    }

    #[test]
    fn record_outside_window_is_rejected() {
        let config = config();
        let mut cache = create(&config);
        cache.next_bill_time = Some(datetime!(2024-01-01 01:00:00 UTC));

        let mut metrics = HashMap::new();
        metrics.insert("managed_node_count".to_string(), 5);
        let stale = UsageRecord::new(datetime!(2023-12-31 00:00:00 UTC), metrics);
        add_usage_record(&mut cache, &config, stale);

        assert!(cache.usage_records.is_empty());
    }

    #[test]
    fn duplicate_reporting_time_is_suppressed() {
        let config = config();
        let mut cache = create(&config);
        cache.next_bill_time = Some(datetime!(2024-01-01 01:00:00 UTC));

        let mut metrics = HashMap::new();
        metrics.insert("managed_node_count".to_string(), 5);
        let record = UsageRecord::new(datetime!(2024-01-01 00:00:00 UTC), metrics);

        add_usage_record(&mut cache, &config, record.clone());
        add_usage_record(&mut cache, &config, record);

        assert_eq!(cache.usage_records.len(), 1);
    }

    #[test]
    fn cache_meter_record_only_writes_last_bill() {
        let config = config();
        let mut cache = create(&config);
        cache.next_bill_time = Some(datetime!(2024-01-01 01:00:00 UTC));
        let mut metrics = HashMap::new();
        metrics.insert("managed_node_count".to_string(), 5);
        add_usage_record(
            &mut cache,
            &config,
            UsageRecord::new(datetime!(2024-01-01 00:30:00 UTC), metrics),
        );

        let mut dims = HashMap::new();
        dims.insert("tier_1".to_string(), 5);
        let mut status = HashMap::new();
        status.insert(
            "managed_node_count".to_string(),
            BilledDimensionStatus::succeeded("rec-1"),
        );

        cache_meter_record(&mut cache, dims, status, "2024-01-01T01:00:00Z".to_string());

        // Neither records nor the bill cursor are touched here.
        assert_eq!(cache.usage_records.len(), 1);
        assert_eq!(cache.next_bill_time.unwrap(), datetime!(2024-01-01 01:00:00 UTC));
        assert!(cache.last_bill.is_some());
        assert_eq!(
            cache.last_bill.as_ref().unwrap().billing_status["managed_node_count"].status,
            DimensionStatus::Succeeded
        );
    }

    #[test]
    fn record_valid_bypassed_in_fixed_mode() {
        assert!(record_valid(
            datetime!(2000-01-01 00:00:00 UTC),
            datetime!(2024-01-01 00:00:00 UTC),
            BillingInterval::Fixed
        ));
    }

    #[test]
    fn billing_due_compares_against_cursor() {
        let config = config();
        let cache = create(&config);
        assert!(!is_billing_due(&cache, cache.adapter_start_time));
        assert!(is_billing_due(&cache, cache.next_bill_time.unwrap()));
    }
}
