//! Tracing subscriber setup for hosts and tools embedding the c2s core.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default log filter when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info,mesh_c2s=debug";

/// Initialize console logging.
///
/// The filter comes from `RUST_LOG`, falling back to [`DEFAULT_FILTER`]. Logs
/// go to stderr so stdout stays free for stanza output.
///
/// Fails if a global subscriber is already installed.
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    tracing::info!("Telemetry initialized");

    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_init_only_once() {
        // Whichever call comes second must fail instead of panicking.
        let first = super::init();
        let second = super::init();
        assert!(first.is_err() || second.is_err());
    }
}
