//! Logging setup.
//!
//! Every component logs through `tracing`. The filter is taken from, in
//! order: `MINITRINO_LOG`, `RUST_LOG`, `debug` when the CLI runs verbose,
//! the `log_level` of the user config, then `info`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "MINITRINO_LOG";

/// Build the log filter for this process.
pub fn env_filter(verbose: bool, configured: Option<&str>) -> EnvFilter {
    let from_env = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok());
    if let Some(filter) = from_env {
        return filter;
    }
    if verbose {
        return EnvFilter::new("debug");
    }
    configured
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays parseable.
///
/// Calling this twice is harmless; the second call is ignored.
pub fn init(verbose: bool, configured: Option<&str>) {
    let result = tracing_subscriber::registry()
        .with(env_filter(verbose, configured))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose)
                .with_level(true),
        )
        .try_init();

    if result.is_ok() {
        tracing::debug!("Logging initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice() {
        init(false, None);
        init(true, None);
    }

    #[test]
    fn test_filter_precedence() {
        if std::env::var(LOG_ENV).is_ok() || std::env::var("RUST_LOG").is_ok() {
            return;
        }
        assert_eq!(env_filter(true, Some("warn")).to_string(), "debug");
        assert_eq!(env_filter(false, Some("warn")).to_string(), "warn");
        assert_eq!(env_filter(false, None).to_string(), "info");
    }
}
