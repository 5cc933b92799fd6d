//! Logging setup for the CLI.
//!
//! Verbosity flags set the default level; `MDSYNC_LOG` (or the config
//! filter) overrides it with a full filter expression. Output goes to
//! stderr so stdout stays clean for the JSON report.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{LogFormat, LoggingConfig};

pub fn init(verbosity: u8, logging: &LoggingConfig) {
    let filter = match logging.filter.as_deref() {
        Some(expr) => EnvFilter::builder()
            .with_default_directive(level_from_verbosity(verbosity).into())
            .parse_lossy(expr),
        None => EnvFilter::builder()
            .with_default_directive(level_from_verbosity(verbosity).into())
            .with_env_var("MDSYNC_LOG")
            .from_env_lossy(),
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = match logging.format {
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init(),
    };
    // A second init (tests, embedding) keeps the first subscriber.
    if let Err(e) = result {
        tracing::debug!("telemetry already initialized: {e}");
    }
}

fn level_from_verbosity(verbosity: u8) -> tracing::metadata::LevelFilter {
    match verbosity {
        0 => tracing::metadata::LevelFilter::WARN,
        1 => tracing::metadata::LevelFilter::INFO,
        _ => tracing::metadata::LevelFilter::DEBUG,
    }
}
