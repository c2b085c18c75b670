// Logging setup for the CLI
//
// Logs go to stderr so stdout only ever carries the report.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Configuration for console logging
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Log filter (e.g., "info", "debug", "stampede_core=debug")
    pub log_filter: Option<String>,
    /// Raise the fallback level to debug
    pub verbose: bool,
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `RUST_LOG` or `LOG_LEVEL`: Log filter
    pub fn from_env() -> Self {
        Self {
            log_filter: std::env::var("RUST_LOG")
                .ok()
                .or_else(|| std::env::var("LOG_LEVEL").ok()),
            verbose: false,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Filter to install: the explicit one if it parses, else info/debug
    pub fn filter(&self) -> EnvFilter {
        let fallback = if self.verbose { "debug" } else { "info" };
        self.log_filter
            .as_ref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new(fallback))
    }
}

/// Install the global subscriber
pub fn init_tracing(config: &TelemetryConfig) {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.verbose)
        .with_filter(config.filter());

    tracing_subscriber::registry().with(console_layer).init();
}
