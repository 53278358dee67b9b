//! Diagnostics for the VWAP engine.
//!
//! Stdout carries the VWAP lines themselves, so console logging goes to
//! stderr, either human-readable or as JSON lines for log shippers. A
//! daily-rotating file under [`LoggingConfig::dir`] can be added on top.
//! `RUST_LOG` overrides [`LoggingConfig::level`].

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Install the global tracing subscriber for the process.
///
/// Fails on an unparsable level or if a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    let (plain_layer, json_layer) = if config.json {
        let layer = fmt::layer().json().with_writer(std::io::stderr).with_target(true);
        (None, Some(layer))
    } else {
        let layer = fmt::layer().with_writer(std::io::stderr).with_target(true).with_ansi(true);
        (Some(layer), None)
    };

    let file_layer = config.dir.as_deref().map(|dir| {
        fmt::layer()
            .with_writer(tracing_appender::rolling::daily(dir, &config.file_prefix))
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(plain_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()?;
    Ok(())
}
