//! Diagnostic logging on stderr via `tracing`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub const LOG_ENV: &str = "SHADOWEYE_LOG";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Used when `SHADOWEYE_LOG` is unset or invalid.
    pub level: &'static str,
    pub format: LogFormat,
}

impl LogConfig {
    pub fn from_verbosity(verbose: bool, quiet: bool, format: LogFormat) -> Self {
        let level = if quiet {
            "error"
        } else if verbose {
            "info"
        } else {
            "warn"
        };
        Self { level, format }
    }
}

/// Installs the global subscriber. Calling it twice is harmless.
pub fn init(config: &LogConfig) {
    let env_filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(config.level));

    let _ = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
}
