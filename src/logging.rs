//! Tracing setup for the binary

use crate::config::Config;
use tracing_subscriber::EnvFilter;

/// Filter directive for a configured level name
///
/// `WARNING` is accepted as an alias of `WARN`; `FATAL` maps to `error`.
pub fn level_directive(log_level: &str) -> &'static str {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug",
        "WARN" | "WARNING" => "warn",
        "ERROR" | "FATAL" => "error",
        _ => "info",
    }
}

/// Directive from the configuration: `quiet` wins over `verbose`, which wins over `log_level`
pub fn config_directive(config: &Config) -> &'static str {
    if config.quiet {
        "error"
    } else if config.verbose {
        "debug"
    } else {
        level_directive(&config.log_level)
    }
}

/// Install the global subscriber writing to stderr
///
/// `RUST_LOG` takes precedence over the configuration when it is set.
/// Calling this twice is harmless; the second call is ignored.
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config_directive(config)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
