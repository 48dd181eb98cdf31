//! Bounded exponential-backoff wrapper. Every call into an external
//! collaborator (storage, CSP, usage source, archive) flows through
//! [`retry`].

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;
use tracing::warn;

/// Backoff parameters for a single retried operation.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Number of retries *in addition to* the first attempt.
    pub retry_count: u32,
    pub retry_delay: Duration,
    /// Multiplier applied to `retry_delay` after each failed attempt.
    pub delay_factor: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_count: 3,
            retry_delay: Duration::from_secs(1),
            delay_factor: 1,
        }
    }
}

impl RetryConfig {
    /// Negative/zero inputs are silently clamped to 1, matching the
    /// reference implementation's defensive clamp.
    pub fn new(retry_count: i64, retry_delay_secs: i64, delay_factor: i64) -> Self {
        Self {
            retry_count: clamp_to_at_least_one(retry_count) as u32,
            retry_delay: Duration::from_secs(clamp_to_at_least_one(retry_delay_secs)),
            delay_factor: clamp_to_at_least_one(delay_factor) as u32,
        }
    }
}

fn clamp_to_at_least_one(value: i64) -> u64 {
    if value <= 0 {
        1
    } else {
        value as u64
    }
}

/// A growing-delay iterator: `retry_delay`, `retry_delay * factor`,
/// `retry_delay * factor^2`, ... This is handed to `tokio_retry::RetryIf`
/// as the backoff strategy.
fn backoff_schedule(config: RetryConfig) -> impl Iterator<Item = Duration> {
    let mut delay = config.retry_delay;
    let factor = config.delay_factor.max(1);
    FixedInterval::from_millis(0)
        .take(config.retry_count as usize)
        .map(move |_| {
            let current = delay;
            delay *= factor;
            current
        })
}

/// Execute `operation`, retrying on failures the `retry_count` additional
/// times described by `config`, with a delay before each retry that grows
/// by `delay_factor` each time. On exhaustion, the last error is returned.
/// `func_name` is logged alongside each retry so operators can tell which
/// external call is flaking.
pub async fn retry<Op, Fut, T, E>(func_name: &str, config: RetryConfig, mut operation: Op) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let schedule = backoff_schedule(config);
    let mut attempt: u32 = 0;

    RetryIf::spawn(
        schedule,
        || {
            attempt += 1;
            let call_name = func_name.to_string();
            let fut = operation();
            async move {
                let result = fut.await;
                if let Err(ref e) = result {
                    warn!(func_name = %call_name, attempt, error = %e, "external call failed, will retry");
                }
                result
            }
        },
        |_: &E| true,
    )
    .await
}
