//! # mfs-config
//!
//! Configuration management for mfs.
//!
//! Loads configuration from:
//! 1. `~/.mfs/config.toml` (global)
//! 2. `.mfs/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)

pub mod logging;
pub mod testing;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

use crate::logging::LogLevel;

/// Global config instance
static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::load().unwrap_or_default()));

/// Get global config (read-only)
pub fn config() -> std::sync::RwLockReadGuard<'static, Config> {
    CONFIG.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Reload config from disk
pub fn reload() -> Result<(), ConfigError> {
    let new_config = Config::load()?;
    *CONFIG.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = new_config;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML render error: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub image: ImageConfig,
    pub shell: ShellConfig,
    pub log: LogConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // 1. Global config (~/.mfs/config.toml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                config = Self::from_file(&global_path)?;
            }
        }

        // 2. Project config (.mfs/config.toml) overrides global
        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from {:?}", project_path);
            let project_config = Self::from_file(&project_path)?;
            config.merge(project_config);
        }

        // 3. Environment variable overrides
        config.apply_env_overrides();

        Ok(config)
    }

    /// Parse one config file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Global config path: ~/.mfs/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".mfs/config.toml"))
    }

    /// Project config path, relative to the working directory.
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".mfs/config.toml")
    }

    /// Merge a project config over this one. Only values that differ from
    /// the defaults replace what is already set.
    pub fn merge(&mut self, other: Config) {
        let defaults = Config::default();
        if other.image.default_path.is_some() {
            self.image.default_path = other.image.default_path;
        }
        if other.image.autosave_on_quit != defaults.image.autosave_on_quit {
            self.image.autosave_on_quit = other.image.autosave_on_quit;
        }
        if other.shell.prompt != defaults.shell.prompt {
            self.shell.prompt = other.shell.prompt;
        }
        if other.shell.echo != defaults.shell.echo {
            self.shell.echo = other.shell.echo;
        }
        if other.log.level != defaults.log.level {
            self.log.level = other.log.level;
        }
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("MFS_IMAGE") {
            self.image.default_path = Some(PathBuf::from(path));
        }
        if let Ok(prompt) = std::env::var("MFS_PROMPT") {
            self.shell.prompt = prompt;
        }
        if let Ok(level) = std::env::var("MFS_LOG_LEVEL") {
            self.log.level = level;
        }
    }

    /// Parsed `log.level`, falling back to `warn` for unknown names.
    pub fn log_level(&self) -> LogLevel {
        self.log.level.parse().unwrap_or(LogLevel::Warn)
    }

    /// Render this config as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        Config::default().to_toml().unwrap_or_default()
    }
}

/// Image configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Image opened when the shell starts
    pub default_path: Option<PathBuf>,
    /// Save the open image before the shell exits
    pub autosave_on_quit: bool,
}

/// Interactive shell configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub prompt: String,
    /// Echo each command read from a script or pipe
    pub echo: bool,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: "mfs> ".to_string(),
            echo: false,
        }
    }
}

/// Log configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// error, warn, info, debug or trace
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}
