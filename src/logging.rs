//! Log level handling.
//!
//! The level is carried around as a value so the external converter can be told about it on every
//! call, instead of each component reaching for a shared logger.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::errors::DtExtractErr;

/// Logging settings for a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogConfig {
    level: Level,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig { level: Level::INFO }
    }
}

impl FromStr for LogConfig {
    type Err = DtExtractErr;

    fn from_str(level: &str) -> Result<Self, Self::Err> {
        let level = match level.trim().to_lowercase().as_str() {
            "critical" | "error" => Level::ERROR,
            "warning" | "warn" => Level::WARN,
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            "trace" => Level::TRACE,
            other => {
                return Err(DtExtractErr::Config(format!("unknown log level: {}", other)));
            }
        };

        Ok(LogConfig { level })
    }
}

impl LogConfig {
    /// Create for a specific level.
    pub fn new(level: Level) -> Self {
        LogConfig { level }
    }

    /// The level of this configuration.
    pub fn level(&self) -> Level {
        self.level
    }

    /// Level name in the upper case form most external tools expect, e.g. `WARNING`.
    pub fn external_name(&self) -> &'static str {
        match self.level {
            Level::ERROR => "ERROR",
            Level::WARN => "WARNING",
            Level::INFO => "INFO",
            _ => "DEBUG",
        }
    }

    /// Install a global subscriber. Only binaries should call this; `RUST_LOG` takes precedence.
    pub fn init(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.to_string().to_lowercase()));

        // Fails only when a subscriber is already installed, which is fine.
        let _ = fmt().with_env_filter(filter).with_target(false).try_init();
    }
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
#[cfg(test)]
mod unit {
    use super::*;

    #[test]
    fn test_parse_levels() {
        assert_eq!(LogConfig::from_str("INFO").unwrap().level(), Level::INFO);
        assert_eq!(LogConfig::from_str("warning").unwrap().level(), Level::WARN);
        assert_eq!(
            LogConfig::from_str("critical").unwrap().level(),
            Level::ERROR
        );
        assert!(LogConfig::from_str("loud").is_err());
    }

    #[test]
    fn test_external_name() {
        assert_eq!(LogConfig::new(Level::WARN).external_name(), "WARNING");
        assert_eq!(LogConfig::new(Level::TRACE).external_name(), "DEBUG");
        assert_eq!(LogConfig::default().external_name(), "INFO");
    }
}
