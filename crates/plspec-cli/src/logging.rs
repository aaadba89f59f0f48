//! Log subscriber setup
//!
//! `PLSPEC_LOG` takes an `EnvFilter` directive (`plspec=debug,warn`). When it
//! is unset the level follows `-q` / `-v`.

use crate::config::Verbosity;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "PLSPEC_LOG";

/// Build the filter for a verbosity level
#[must_use]
pub fn env_filter(verbosity: Verbosity) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(verbosity.default_log_filter()))
}

/// Install the global subscriber, writing to stderr
///
/// A second call leaves the first subscriber in place.
pub fn init(verbosity: Verbosity, use_color: bool) {
    let result = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbosity))
        .with_writer(std::io::stderr)
        .with_ansi(use_color)
        .with_target(verbosity == Verbosity::Debug)
        .try_init();
    if result.is_err() {
        tracing::debug!("log subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init(Verbosity::Quiet, false);
        init(Verbosity::Debug, false);
    }

    #[test]
    fn test_filter_follows_verbosity() {
        if std::env::var_os(LOG_ENV).is_none() {
            assert_eq!(env_filter(Verbosity::Quiet).to_string(), "error");
            assert_eq!(env_filter(Verbosity::Debug).to_string(), "debug");
        }
    }
}
