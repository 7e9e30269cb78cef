//! # Structured Logging Module
//!
//! Environment-aware structured logging for debugging concurrent pipeline
//! execution. Console output is human-readable; set `PIPELINE_LOG_JSON=1`
//! for machine-parseable JSON lines.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call more than once; only the first call installs a subscriber.
/// If an embedding application already installed a global subscriber, this
/// is a no-op.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = detect_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_log_level(&environment)));

        let json_output = std::env::var("PIPELINE_LOG_JSON").is_ok_and(|v| v == "1");

        let registry = tracing_subscriber::registry().with(filter);
        let result = if json_output {
            registry
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_level(true)
                        .with_ansi(false)
                        .json(),
                )
                .try_init()
        } else {
            registry
                .with(fmt::layer().with_target(true).with_level(true))
                .try_init()
        };

        if result.is_err() {
            tracing::debug!("global tracing subscriber already installed, continuing");
        }

        tracing::info!(
            environment = %environment,
            "🔧 structured logging initialized"
        );
    });
}

/// Detect the runtime environment from environment variables
fn detect_environment() -> String {
    std::env::var("PIPELINE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Default log level for an environment when RUST_LOG is unset
fn default_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}
