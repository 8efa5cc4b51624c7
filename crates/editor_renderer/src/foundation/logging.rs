//! Logging utilities and structured logging support

use serde::{Deserialize, Serialize};
use std::sync::Once;

pub use log::{debug, info, warn, error, trace};

/// ANSI colouring behaviour of the log output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogWriteStyle {
    /// Colour when the output is a terminal
    #[default]
    Auto,
    /// Always colour
    Always,
    /// Never colour
    Never,
}

impl From<LogWriteStyle> for env_logger::WriteStyle {
    fn from(style: LogWriteStyle) -> Self {
        match style {
            LogWriteStyle::Auto => Self::Auto,
            LogWriteStyle::Always => Self::Always,
            LogWriteStyle::Never => Self::Never,
        }
    }
}

/// Logger configuration
///
/// `env_filter` follows the `env_logger` filter syntax (e.g. "info",
/// "editor_renderer=debug"). When absent, `RUST_LOG` is consulted and the
/// level falls back to `info`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directives
    pub env_filter: Option<String>,
    /// Colouring of the output
    pub write_style: LogWriteStyle,
}

static INIT: Once = Once::new();

/// Initialize the logging system
pub fn init() {
    init_with_config(&LoggingConfig::default());
}

/// Initialize the logging system from a configuration
///
/// Only the first call has an effect; later calls are ignored.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();

        if let Some(filter) = &config.env_filter {
            builder.parse_filters(filter);
        } else if let Ok(filter) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filter);
        } else {
            builder.filter_level(log::LevelFilter::Info);
        }

        builder.write_style(config.write_style.into());

        // A test harness may already have installed a logger.
        if builder.try_init().is_ok() {
            log::debug!("logging initialized");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init();
        init_with_config(&LoggingConfig {
            env_filter: Some("debug".to_string()),
            write_style: LogWriteStyle::Never,
        });
        info!("still logging after repeated init");
    }

    #[test]
    fn test_write_style_parses_lowercase() {
        let config: LoggingConfig =
            toml::from_str("env_filter = \"warn\"\nwrite_style = \"never\"").unwrap();
        assert_eq!(config.write_style, LogWriteStyle::Never);
        assert_eq!(config.env_filter.as_deref(), Some("warn"));
    }
}
