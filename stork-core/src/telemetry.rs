//! Shared `tracing` subscriber setup for the server, agent and CLI
//! binaries. Library code never prints to stdout/stderr directly; it emits
//! `tracing` events and leaves presentation to whichever binary called
//! [`LoggingConfig::try_init`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("init logging error: {0}")]
    TryInit(String),
    #[error("invalid directive `{0}` in `level`: {1}")]
    InvalidDirective(String, String),
}

/// Held for the process lifetime; dropping it flushes the file appender's
/// background writer.
pub type LoggingGuard = Option<WorkerGuard>;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive string, e.g. `"info"` or
    /// `"stork_server=debug,stork_core=info"`.
    #[serde(default = "default_level")]
    pub level: String,
    /// When set, file logs are additionally written under this directory
    /// with daily rotation, via a non-blocking appender.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_level() -> String {
    "info".to_string()
}

impl LoggingConfig {
    pub fn try_init(&self, file_prefix: &str) -> Result<LoggingGuard, LoggingError> {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
            .with_filter(self.filter()?);

        let (file_layer, guard) = match &self.log_dir {
            Some(dir) => {
                let appender = tracing_appender::rolling::daily(dir, file_prefix);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
                    .with_filter(self.filter()?);
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .map_err(|e| LoggingError::TryInit(e.to_string()))?;

        Ok(guard)
    }

    fn filter(&self) -> Result<EnvFilter, LoggingError> {
        let mut filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .parse_lossy("");
        for directive in self.level.split(',').filter(|s| !s.is_empty()) {
            let parsed: Directive = directive.parse().map_err(|e: <Directive as std::str::FromStr>::Err| {
                LoggingError::InvalidDirective(directive.to_string(), e.to_string())
            })?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_level_is_info() {
        assert_eq!(LoggingConfig::default().level, "info");
    }

    #[test]
    fn rejects_malformed_directive() {
        let config = LoggingConfig {
            level: "not a directive!!".to_string(),
            log_dir: None,
        };
        assert!(config.filter().is_err());
    }

    #[test]
    fn accepts_per_crate_directives() {
        let config = LoggingConfig {
            level: "stork_server=debug,stork_core=warn".to_string(),
            log_dir: None,
        };
        assert!(config.filter().is_ok());
    }
}
