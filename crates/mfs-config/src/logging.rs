//! Structured logging utilities for mfs components.
//!
//! Provides consistent logging with component prefixes and structured fields.
//!
//! # Usage
//!
//! ```ignore
//! use mfs_config::{log_image_info, log_shell_debug};
//!
//! log_image_info!("Image opened", path = "disk.img");
//! log_shell_debug!("Dispatching command", command = "insert");
//! ```

use std::str::FromStr;

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const IMAGE: &'static str = "IMAGE";
    pub const SHELL: &'static str = "SHELL";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

// === IMAGE logging macros ===

#[macro_export]
macro_rules! log_image_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "IMAGE", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_image_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "IMAGE", $($key = $value,)* $msg)
    };
}

// === SHELL logging macros ===

#[macro_export]
macro_rules! log_shell_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "SHELL", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_shell_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "SHELL", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_shell_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "SHELL", $($key = $value,)* $msg)
    };
}

/// Initialize logging with the given level filter.
/// Call this once at application startup.
///
/// `MFS_LOG`, then `RUST_LOG`, override `level` when set. Output goes to
/// stderr so it never mixes with command output.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_env("MFS_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    // A subscriber may already be installed (tests, embedding); keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_constants() {
        assert_eq!(Component::IMAGE, "IMAGE");
        assert_eq!(Component::SHELL, "SHELL");
    }

    #[test]
    fn test_parse_levels() {
        assert_eq!("INFO".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("verbose".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Trace.as_str(), "trace");
    }

    #[test]
    fn test_macros_expand() {
        log_image_info!("image event", blocks = 3);
        log_shell_debug!("shell event", command = "df");
        log_image_warn!("no fields");
    }
}
