//! Subscriber setup for binaries embedding the library

use hfserve_types::{Result, ServeError};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global `tracing` subscriber.
///
/// `level` is the default directive (`trace` .. `error`, unknown values
/// fall back to `info`); `RUST_LOG` directives are layered on top.
/// `format` is `json`, `compact` or `pretty`. Fails if a subscriber is
/// already installed.
pub fn init_logging(level: &str, format: &str) -> Result<()> {
    let level = parse_level(level);
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format.to_lowercase().as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        "compact" => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
    };
    installed.map_err(|e| ServeError::config(format!("Failed to install logger: {}", e)))?;

    info!(%level, format, "Logging initialized");
    Ok(())
}

fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!(parse_level("DEBUG"), tracing::Level::DEBUG);
        assert_eq!(parse_level("warning"), tracing::Level::WARN);
        assert_eq!(parse_level("verbose"), tracing::Level::INFO);
    }

    #[test]
    fn second_install_is_an_error() {
        // Whichever call wins the race, the other must fail cleanly
        let first = init_logging("debug", "compact");
        let second = init_logging("info", "json");
        assert!(first.is_err() || second.is_err());
        if let Err(err) = second {
            assert!(matches!(err, ServeError::Config { .. }));
        }
    }
}
