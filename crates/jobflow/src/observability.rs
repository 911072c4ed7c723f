//! # Observability
//!
//! Provides a simple, configurable interface for initializing tracing output for
//! `jobflow`.
//!
//! The engine emits spans per run (`parallel_engine_run`), per batch (`batch`) and per
//! job (`parallel_job`); this module installs a subscriber that prints them.

use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Configuration for initializing the observability system.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// The maximum log level to capture for `jobflow` targets.
    pub level: Level,
    pub target: LogTarget,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            target: LogTarget::default(),
        }
    }
}

impl ObservabilityConfig {
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    fn filter(&self) -> Result<EnvFilter, Box<dyn std::error::Error>> {
        Ok(EnvFilter::from_default_env().add_directive(format!("jobflow={}", self.level).parse()?))
    }
}

/// Defines the output target for logs.
#[derive(Debug, Clone, Default)]
pub enum LogTarget {
    /// Log to the console (stdout).
    #[default]
    Console,
    /// Log to a file.
    File(String),
}

/// Initializes the global tracing subscriber.
///
/// Call once at the beginning of the application. `RUST_LOG` directives are honoured in
/// addition to the configured level.
///
/// # Errors
///
/// Returns an error if the filter directive is invalid, the log file cannot be created,
/// or a global subscriber is already installed.
pub fn init(config: ObservabilityConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = config.filter()?;
    let subscriber = tracing_subscriber::registry().with(filter);

    match config.target {
        LogTarget::Console => {
            let layer = fmt::layer().with_writer(std::io::stdout);
            subscriber.with(layer).try_init()?;
        }
        LogTarget::File(path) => {
            let file = std::fs::File::create(path)?;
            let layer = fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false);
            subscriber.with(layer).try_init()?;
        }
    };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(matches!(config.target, LogTarget::Console));
    }

    #[test]
    fn test_builder_and_filter() {
        let config = ObservabilityConfig::default()
            .with_level(Level::DEBUG)
            .with_target(LogTarget::File("run.log".to_string()));

        assert_eq!(config.level, Level::DEBUG);
        assert!(matches!(config.target, LogTarget::File(ref p) if p == "run.log"));
        assert!(config.filter().is_ok());
    }
}
