use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

/// Installs the global subscriber. `RUST_LOG` overrides `default_level`;
/// verbose logging raises the default to `debug`.
pub fn init_logging(default_level: &str, verbose: bool) {
    let default_level = if verbose { "debug" } else { default_level };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .compact()
        .init();
}
