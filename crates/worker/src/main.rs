//! Binary entry point. Thin by design: wire a concrete plugin set,
//! load config, install logging, and hand off to the event loop. All
//! billing policy lives in `billing-adapter-core`.

use std::process::ExitCode;

use anyhow::Context;
use billing_adapter_core::hooks::PluginSet;
use billing_adapter_shared::config::Config;
use billing_adapter_shared::error::AdapterError;
use billing_adapter_worker::event_loop::{self, Shutdown};
use billing_adapter_worker::plugins::{DemoCsp, MemoryArchive, MemoryStorage, SampleUsageSource};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let csp = DemoCsp::default();

    let config = match load_config(&csp) {
        Ok(config) => config,
        Err(e) => {
            // No tracing subscriber yet at this point; this is the one
            // place the adapter talks to stderr directly.
            eprintln!("failed to load configuration: {e}");
            return ExitCode::from(1);
        }
    };

    init_tracing(&config.logging.level);
    info!(
        billing_interval = ?config.billing_interval,
        query_interval = config.query_interval,
        reporting_interval = config.reporting_interval,
        "csp billing adapter starting"
    );

    let plugins = PluginSet::new(
        Box::new(csp),
        Box::new(SampleUsageSource::default()),
        Box::new(MemoryStorage::new()),
        Box::new(MemoryArchive::default()),
    );

    match run_adapter(plugins, config).await {
        Ok(Shutdown::Signal) => {
            info!("shutdown complete");
            ExitCode::from(0)
        }
        Err(e) => {
            error!(error = ?e, "adapter exited with a fatal error");
            // event_loop::run only ever fails with an AdapterError; the
            // anyhow::Error wrapper exists so this boundary doesn't need
            // its own error type just to attach operational context.
            let code = e
                .downcast_ref::<AdapterError>()
                .map(exit_code_for)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

/// Runs the event loop behind `anyhow`, the way the teacher's queue
/// processors report heterogeneous failures without a bespoke error
/// type per call site. The precise `AdapterError` still rides inside
/// and is recovered via `downcast_ref` for exit-code mapping.
async fn run_adapter(plugins: PluginSet, config: Config) -> anyhow::Result<Shutdown> {
    event_loop::run(plugins, config)
        .await
        .context("running the csp billing adapter event loop")
}

/// Every variant here can only reach `main` through the bootstrap
/// sequence (`event_loop::bootstrap`): steady-state tick failures are
/// always caught and recorded into `csp_config.errors` without
/// propagating. `MeteringFailed` specifically can only arrive via the
/// startup metering test, which the bootstrap protocol aborts with
/// exit code 2 regardless of the underlying failure. `Storage` and
/// `UsageSource` are not named core-protocol exceptions and are
/// treated as unexpected bootstrap failures.
fn exit_code_for(error: &AdapterError) -> u8 {
    match error {
        AdapterError::InvalidConfig(_)
        | AdapterError::FailedToSaveCache(_)
        | AdapterError::FailedToSaveCspConfig(_)
        | AdapterError::NoMatchingVolumeDimension { .. }
        | AdapterError::MissingTieredDimension { .. }
        | AdapterError::ConsumptionReportingInvalid { .. }
        | AdapterError::MeteringFailed(_) => 2,
        AdapterError::Storage(_) | AdapterError::UsageSource(_) => 1,
    }
}

/// Load the YAML config from disk (or `CSP_ADAPTER_CONFIG_FILE`),
/// merged under the CSP plugin's own defaults, user values winning.
fn load_config(csp: &DemoCsp) -> Result<Config, AdapterError> {
    let path = Config::resolve_path(None);
    Config::load_from_file(&path, csp.load_defaults())
}

/// Drive `tracing-subscriber`'s env-filter from `config.logging.level`,
/// letting `RUST_LOG` override it when set (matching the reference
/// implementation's config-then-env precedence for the one setting
/// that's meaningful before the rest of config is trusted).
fn init_tracing(configured_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(configured_level.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .json()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_errors_exit_two() {
        let err = AdapterError::InvalidConfig("missing usage_metrics".to_string());
        assert_eq!(exit_code_for(&err), 2);
    }

    #[test]
    fn metering_test_failure_at_bootstrap_exits_two() {
        let err = AdapterError::MeteringFailed("network down".to_string());
        assert_eq!(exit_code_for(&err), 2);
    }

    #[test]
    fn unnamed_bootstrap_failures_exit_one() {
        assert_eq!(exit_code_for(&AdapterError::Storage("down".to_string())), 1);
        assert_eq!(exit_code_for(&AdapterError::UsageSource("down".to_string())), 1);
    }
}
