use crate::config::LoggingConfig;
use parley_agent::TelemetryConfig;
use tracing_subscriber::EnvFilter;

const QUIET_FILTER: &str = "warn";
const TRACING_FILTER: &str = "info,parley_agent=debug,parley_session=debug";

/// Installs the global subscriber. Logs go to stderr so they never mix
/// with the conversation on stdout.
///
/// `RUST_LOG` wins over the telemetry toggle.
pub fn init_tracing(logging: &LoggingConfig, telemetry: &TelemetryConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(telemetry)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }

    if telemetry.enabled && telemetry.project.is_none() {
        tracing::warn!("Tracing enabled without PARLEY_PROJECT; spans carry no project label");
    }
}

fn default_directive(telemetry: &TelemetryConfig) -> &'static str {
    if telemetry.enabled {
        TRACING_FILTER
    } else {
        QUIET_FILTER
    }
}
