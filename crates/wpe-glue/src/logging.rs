//! Tracing setup for the glue library.
//!
//! On Android no `tracing` subscriber is installed: events fall through to
//! the `log` facade (tracing's `log` feature) and `android_logger` writes
//! them to logcat under the configured tag. Elsewhere a compact fmt
//! subscriber writes to stderr.

use crate::config::GlueConfig;
use std::sync::Once;

static INIT: Once = Once::new();

/// Filter used when the configured directive does not parse.
#[cfg(not(target_os = "android"))]
const FALLBACK_FILTER: &str = "info";

/// Install the global logger. Later calls are no-ops.
pub fn init(config: &GlueConfig) {
    INIT.call_once(|| install(config));
}

#[cfg(target_os = "android")]
fn install(config: &GlueConfig) {
    use android_logger::{Config, FilterBuilder};
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Trace)
            .with_tag(config.log_tag.as_str())
            .with_filter(FilterBuilder::new().parse(&config.log_filter).build()),
    );
}

#[cfg(not(target_os = "android"))]
fn install(config: &GlueConfig) {
    // If the host process already installed a subscriber, that one is kept
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config.log_filter))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false)
        .with_thread_names(true)
        .compact()
        .try_init();
}

/// `directive` as an `EnvFilter`, or [`FALLBACK_FILTER`] if it is invalid.
#[cfg(not(target_os = "android"))]
fn env_filter(directive: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_new(directive)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(FALLBACK_FILTER))
}

#[cfg(all(test, not(target_os = "android")))]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn test_invalid_directive_falls_back() {
        assert_eq!(env_filter("debug").max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(env_filter("wpe=loud").max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = GlueConfig::default();
        init(&config);
        init(&config);
        assert!(INIT.is_completed());
    }
}
