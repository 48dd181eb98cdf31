//! Bootstrap and steady-state event loop.
//!
//! Single-threaded cooperative scheduling: one task owns both `cache`
//! and `csp_config` and mutates them in sequence each tick. External
//! calls (storage, CSP, usage source) are the only suspension points
//! and all flow through [`billing_adapter_core::retry`].

use std::collections::HashMap;
use std::time::Duration;

use billing_adapter_core::cache as cache_store;
use billing_adapter_core::csp_config_store;
use billing_adapter_core::hooks::PluginSet;
use billing_adapter_core::{process_metering, retry, RetryConfig};
use billing_adapter_shared::config::Config;
use billing_adapter_shared::error::{AdapterError, AdapterResult};
use billing_adapter_shared::time_util::now_utc;
use billing_adapter_shared::types::{Cache, CspConfig};
use time::OffsetDateTime;
use tracing::{error, info, warn};

/// How the event loop stopped. Only a clean signal-triggered shutdown
/// is modeled here; every other way the loop can end is a fatal
/// `AdapterError` surfaced through the `Result`.
pub enum Shutdown {
    /// A process signal interrupted an inter-tick sleep. No partial
    /// tick was in flight; the caller should exit 0.
    Signal,
}

/// Run the adapter: bootstrap once, then tick forever until a signal
/// interrupts an inter-tick sleep. `config` is already loaded; the
/// caller built `plugins` (wiring real or reference hook
/// implementations per group).
pub async fn run(plugins: PluginSet, config: Config) -> AdapterResult<Shutdown> {
    let (mut cache, mut csp_config) = bootstrap(&plugins, &config).await?;

    loop {
        let start = now_utc();
        csp_config.errors.clear();

        run_tick(&plugins, &config, start, &mut cache, &mut csp_config).await;
        persist(&plugins, &config, &cache, &mut csp_config).await;
        csp_config.timestamp = start;

        let elapsed = (now_utc() - start).whole_seconds().max(0) as u64;
        let remaining = config.query_interval.saturating_sub(elapsed);

        if wait_for_next_tick(remaining).await {
            info!("signal received, shutting down cleanly");
            return Ok(Shutdown::Signal);
        }
    }
}

/// Bootstrap sequence (§4.7): set up the CSP client, load or create
/// both persistent documents, run the dry-run metering test, and (on a
/// brand new deployment) let one `query_interval` of usage accumulate
/// before the first real tick.
async fn bootstrap(plugins: &PluginSet, config: &Config) -> AdapterResult<(Cache, CspConfig)> {
    retry("csp.setup_adapter", RetryConfig::default(), || {
        plugins.csp.setup_adapter(config)
    })
    .await?;

    let mut csp_config = match retry("storage.get_csp_config", RetryConfig::default(), || {
        plugins.storage.get_csp_config(config)
    })
    .await?
    {
        Some(existing) => existing,
        None => {
            let account_info = retry("csp.account_info", RetryConfig::default(), || {
                plugins.csp.account_info(config)
            })
            .await?;

            let (name, version) = plugins.csp.version();
            let mut versions = HashMap::new();
            versions.insert(name, version);

            let fresh = csp_config_store::create(
                config,
                account_info,
                plugins.archive.archive_location(),
                versions,
            );

            retry("storage.save_csp_config", RetryConfig::default(), || {
                plugins.storage.save_csp_config(config, &fresh)
            })
            .await
            .map_err(|e| AdapterError::FailedToSaveCspConfig(e.to_string()))?;

            fresh
        }
    };

    let (cache, initial_deploy) = match retry("storage.get_cache", RetryConfig::default(), || {
        plugins.storage.get_cache(config)
    })
    .await?
    {
        Some(existing) => (existing, false),
        None => {
            let fresh = cache_store::create(config);

            retry("storage.save_cache", RetryConfig::default(), || {
                plugins.storage.save_cache(config, &fresh)
            })
            .await
            .map_err(|e| AdapterError::FailedToSaveCache(e.to_string()))?;

            (fresh, true)
        }
    };

    run_metering_test(plugins, config, &mut csp_config).await?;

    if initial_deploy {
        info!(query_interval = config.query_interval, "first deploy, waiting for initial usage samples");
        tokio::time::sleep(Duration::from_secs(config.query_interval)).await;
    }

    Ok((cache, csp_config))
}

/// Dry-run `meter_billing` against the first configured metric's first
/// dimension at quantity zero, validating both the config shape and
/// CSP reachability before the loop commits to real billing.
async fn run_metering_test(plugins: &PluginSet, config: &Config, csp_config: &mut CspConfig) -> AdapterResult<()> {
    let (_, dimension) = config.first_metric_and_dimension()?;

    let mut probe = HashMap::new();
    probe.insert(dimension.dimension.clone(), 0i64);

    let now = now_utc();
    let result = retry("csp.meter_billing (metering test)", RetryConfig::default(), || {
        plugins.csp.meter_billing(config, &probe, now, now, now, true)
    })
    .await;

    if let Err(e) = result {
        error!(error = %e, "metering test failed, adapter cannot start");
        csp_config.errors = vec![e.to_string()];
        csp_config.billing_api_access_ok = false;

        // Best-effort: record the failure for the operator even though
        // we're about to abort.
        let _ = retry("storage.save_csp_config", RetryConfig::default(), || {
            plugins.storage.save_csp_config(config, csp_config)
        })
        .await;

        return Err(e);
    }

    Ok(())
}

/// One steady-state tick: sample usage, run the engine if a billing or
/// reporting deadline has passed, otherwise do nothing.
async fn run_tick(
    plugins: &PluginSet,
    config: &Config,
    now: OffsetDateTime,
    cache: &mut Cache,
    csp_config: &mut CspConfig,
) {
    match retry("usage.get_usage_data", RetryConfig::default(), || {
        plugins.usage.get_usage_data(config)
    })
    .await
    {
        Ok(Some(record)) => {
            if let Some(base_product) = record.base_product.clone() {
                csp_config.base_product = Some(base_product);
            }
            cache_store::add_usage_record(cache, config, record);
        }
        Ok(None) => {}
        Err(e) => {
            warn!(error = %e, "usage retrieval failed this tick");
            csp_config.errors.push(format!("usage retrieval failed: {e}"));
        }
    }

    let empty_metering = if cache_store::is_billing_due(cache, now) {
        false
    } else if cache_store::is_reporting_due(cache, now) {
        true
    } else {
        return;
    };

    if let Err(e) = process_metering(
        plugins.csp.as_ref(),
        plugins.archive.as_ref(),
        config,
        now,
        cache,
        csp_config,
        empty_metering,
    )
    .await
    {
        error!(error = %e, empty_metering, "metering attempt could not complete");
        csp_config.errors.push(e.to_string());
    }
}

/// Persist both documents via the shallow-merge `update` hook,
/// recording (but not escalating) storage failures.
async fn persist(plugins: &PluginSet, config: &Config, cache: &Cache, csp_config: &mut CspConfig) {
    if let Err(e) = retry("storage.update_cache", RetryConfig::default(), || {
        plugins.storage.update_cache(config, cache, false)
    })
    .await
    {
        warn!(error = %e, "failed to persist cache");
        csp_config.errors.push(format!("failed to persist cache: {e}"));
    }

    if let Err(e) = retry("storage.update_csp_config", RetryConfig::default(), || {
        plugins.storage.update_csp_config(config, csp_config, false)
    })
    .await
    {
        warn!(error = %e, "failed to persist csp_config");
        csp_config.errors.push(format!("failed to persist csp_config: {e}"));
    }
}

/// Sleep for `remaining_secs`, or return early if a shutdown signal
/// arrives first. Returns `true` iff a signal interrupted the sleep.
#[cfg(unix)]
async fn wait_for_next_tick(remaining_secs: u64) -> bool {
    let sleep = tokio::time::sleep(Duration::from_secs(remaining_secs));
    tokio::pin!(sleep);

    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler, only SIGINT will shut down cleanly");
            tokio::select! {
                _ = &mut sleep => return false,
                _ = tokio::signal::ctrl_c() => return true,
            }
        }
    };

    tokio::select! {
        _ = &mut sleep => false,
        _ = tokio::signal::ctrl_c() => true,
        _ = sigterm.recv() => true,
    }
}

#[cfg(not(unix))]
async fn wait_for_next_tick(remaining_secs: u64) -> bool {
    let sleep = tokio::time::sleep(Duration::from_secs(remaining_secs));
    tokio::pin!(sleep);

    tokio::select! {
        _ = &mut sleep => false,
        _ = tokio::signal::ctrl_c() => true,
    }
}
