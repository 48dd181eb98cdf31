//! Time helpers: UTC "now", RFC-3339 round-trip, and billing-period
//! arithmetic for the cache's billing/reporting cursors.

use std::time::Duration;

use time::format_description::well_known::Rfc3339;
use time::{Date, Month, OffsetDateTime, Time};

use crate::config::BillingInterval;

/// Current UTC instant. Centralized so tests can avoid depending on
/// wall-clock time by constructing `OffsetDateTime`s directly instead.
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Render a UTC timestamp as RFC-3339, e.g. `2024-03-01T00:00:00Z`.
pub fn date_to_string(date: OffsetDateTime) -> String {
    date.format(&Rfc3339).unwrap_or_else(|_| date.to_string())
}

/// Parse an RFC-3339 / ISO-8601 timestamp, accepting both strict
/// fractional-second and bare tz-offset forms.
pub fn string_to_date(timestamp: &str) -> Result<OffsetDateTime, time::error::Parse> {
    OffsetDateTime::parse(timestamp, &Rfc3339)
}

/// `date` at `00:00:00` UTC, used to turn a fixed-mode billing date into
/// a cursor instant without a fallible `Time` construction.
pub fn midnight_utc(date: Date) -> OffsetDateTime {
    date.with_time(Time::MIDNIGHT).assume_utc()
}

/// Arithmetic delta: add a number of seconds to a timestamp.
pub fn get_date_delta(date: OffsetDateTime, seconds: i64) -> OffsetDateTime {
    if seconds >= 0 {
        date + Duration::from_secs(seconds as u64)
    } else {
        date - Duration::from_secs((-seconds) as u64)
    }
}

/// Add one calendar month to `date`, preserving day-of-month where legal
/// and clamping to the last valid day of the target month otherwise
/// (e.g. Jan 31 + 1 month = Feb 28/29).
fn add_calendar_month(date: OffsetDateTime) -> OffsetDateTime {
    let (year, month) = (date.year(), date.month());
    let (target_year, target_month) = match month {
        Month::December => (year + 1, Month::January),
        other => (year, other.next()),
    };

    let day = date.day();
    let mut clamped_day = day;
    let new_date = loop {
        match Date::from_calendar_date(target_year, target_month, clamped_day) {
            Ok(d) => break d,
            Err(_) => {
                clamped_day -= 1;
                if clamped_day == 0 {
                    // Should not happen for any real month, but avoid looping forever.
                    #[allow(clippy::expect_used)] // day 1 is valid in every month
                    break Date::from_calendar_date(target_year, target_month, 1)
                        .expect("first of month is always valid");
                }
            }
        }
    };

    new_date.with_time(date.time()).assume_offset(date.offset())
}

/// Subtract one calendar month from `date`, with the same clamping rule
/// as [`add_calendar_month`].
fn sub_calendar_month(date: OffsetDateTime) -> OffsetDateTime {
    let (year, month) = (date.year(), date.month());
    let (target_year, target_month) = match month {
        Month::January => (year - 1, Month::December),
        other => (year, other.previous()),
    };

    let day = date.day();
    let mut clamped_day = day;
    let new_date = loop {
        match Date::from_calendar_date(target_year, target_month, clamped_day) {
            Ok(d) => break d,
            Err(_) => {
                clamped_day -= 1;
                if clamped_day == 0 {
                    #[allow(clippy::expect_used)] // day 1 is valid in every month
                    break Date::from_calendar_date(target_year, target_month, 1)
                        .expect("first of month is always valid");
                }
            }
        }
    };

    new_date.with_time(date.time()).assume_offset(date.offset())
}

/// Advance `date` by exactly one `billing_interval`. `Fixed` has no
/// periodic notion of "next" and returns `date` unchanged; callers in
/// fixed mode drive cursors from `remaining_billing_dates` instead.
pub fn get_next_bill_time(date: OffsetDateTime, interval: BillingInterval) -> OffsetDateTime {
    match interval {
        BillingInterval::Hourly => date + Duration::from_secs(3600),
        BillingInterval::Daily => date + Duration::from_secs(86_400),
        BillingInterval::Monthly => add_calendar_month(date),
        BillingInterval::Test => date + Duration::from_secs(5 * 60),
        BillingInterval::Fixed => date,
    }
}

/// Inverse of [`get_next_bill_time`]: the start of the billing period
/// that ends at `date`.
pub fn get_prev_bill_time(date: OffsetDateTime, interval: BillingInterval) -> OffsetDateTime {
    match interval {
        BillingInterval::Hourly => date - Duration::from_secs(3600),
        BillingInterval::Daily => date - Duration::from_secs(86_400),
        BillingInterval::Monthly => sub_calendar_month(date),
        BillingInterval::Test => date - Duration::from_secs(5 * 60),
        BillingInterval::Fixed => date,
    }
}
