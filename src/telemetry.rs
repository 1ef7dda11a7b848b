use anyhow::Context;

use tracing::subscriber::set_global_default;

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber for the queue runner.
///
/// `default_filter` applies when `RUST_LOG` is not set.
pub fn init(default_filter: &str) -> anyhow::Result<()> {
    tracing_log::LogTracer::init().context("Failed to initalize logging")?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .finish();

    set_global_default(subscriber).context("Failed to set global subscriber")
}
