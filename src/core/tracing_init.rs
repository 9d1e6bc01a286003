use crate::core::config::LoggingConfig;
use anyhow::{bail, Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("Invalid log level '{}'", config.level))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    match (config.console, config.format.as_str()) {
        (true, _) | (false, "console") => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_thread_ids(true),
            )
            .try_init(),
        (false, "json") => registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(true))
            .try_init(),
        (false, other) => bail!("Unknown log format '{}', expected 'json' or 'console'", other),
    }
    .context("Failed to install tracing subscriber")
}
