//! Centralised tracing initialisation for the launcher binaries.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored (the
//! global subscriber can only be set once per process).

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Filter source checked before `RUST_LOG`.
pub const LOG_ENV: &str = "CORONA_LOG";

fn env_filter(logging: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialise the global subscriber, writing to stderr.
///
/// The filter comes from `CORONA_LOG`, then `RUST_LOG`, then
/// `logging.level`. `logging.json` switches to newline-delimited JSON.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = env_filter(logging);

    if logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .try_init()
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        let logging = LoggingConfig::default();
        init_tracing(&logging);
        init_tracing(&logging);
    }

    #[test]
    fn test_bad_level_falls_back() {
        let logging = LoggingConfig {
            level: "[[not a directive".to_string(),
            json: false,
        };
        // Must not panic whatever the environment holds.
        let _ = env_filter(&logging);
    }
}
