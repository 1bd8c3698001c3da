//! Configuration for the verification runtime
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/vigil/config.toml)
//! 3. Built-in defaults (lowest priority)

use crate::tracer::AnalysisMode;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Template written on first run so users can discover the options.
const CONFIG_TEMPLATE: &str = r#"# vigil configuration
#
# Values here override the built-in defaults; VIGIL_* environment
# variables override values here.

# Where monitor reduction runs: "inline" (on the tracer) or "external"
# (dedicated analyzer tasks).
#analysis = "inline"

# Directory for audit logs.
#log_dir = "logs"

# Write verdict reports to a JSON Lines audit file.
#audit = true

[logging]
# Default log level: trace, debug, info, warn, error
#level = "info"
"#;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Where monitor reduction runs
    pub analysis: AnalysisMode,

    /// Directory for storing audit logs
    pub log_dir: PathBuf,

    /// Whether verdict reports are written to disk
    pub audit: bool,

    /// Logging settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default log level when RUST_LOG is not set
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            analysis: AnalysisMode::Inline,
            log_dir: PathBuf::from("logs"),
            audit: true,
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

/// File-level representation: everything optional so a partial config file
/// only overrides what it mentions.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    analysis: Option<AnalysisMode>,
    log_dir: Option<PathBuf>,
    audit: Option<bool>,
    logging: Option<FileLogging>,
}

#[derive(Debug, Default, Deserialize)]
struct FileLogging {
    level: Option<String>,
}

impl Config {
    /// Path of the config file, if a config directory exists on this
    /// platform.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("vigil").join("config.toml"))
    }

    /// Write the commented template if no config file exists yet.
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };
        if path.exists() {
            return;
        }
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::warn!("could not create config directory: {e}");
                return;
            }
        }
        if let Err(e) = fs::write(&path, CONFIG_TEMPLATE) {
            tracing::warn!("could not write config template: {e}");
        }
    }

    /// Reset the config file to the commented template.
    pub fn reset_config_file() -> std::io::Result<PathBuf> {
        let path = Self::config_path()
            .ok_or_else(|| std::io::Error::other("no config directory on this platform"))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, CONFIG_TEMPLATE)?;
        Ok(path)
    }

    /// Effective configuration: defaults, then config file, then
    /// environment variables.
    pub fn from_env() -> Self {
        let file = Self::load_file();
        let mut config = Config::default().merged(file);

        if let Ok(value) = std::env::var("VIGIL_ANALYSIS") {
            match parse_analysis(&value) {
                Some(analysis) => config.analysis = analysis,
                None => tracing::warn!("ignoring invalid VIGIL_ANALYSIS={value}"),
            }
        }
        if let Ok(value) = std::env::var("VIGIL_LOG_DIR") {
            config.log_dir = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("VIGIL_AUDIT") {
            match parse_bool(&value) {
                Some(audit) => config.audit = audit,
                None => tracing::warn!("ignoring invalid VIGIL_AUDIT={value}"),
            }
        }
        if let Ok(value) = std::env::var("VIGIL_LOG_LEVEL") {
            config.logging.level = value;
        }

        config
    }

    fn load_file() -> FileConfig {
        let Some(path) = Self::config_path() else {
            return FileConfig::default();
        };
        let Ok(text) = fs::read_to_string(&path) else {
            return FileConfig::default();
        };
        match toml::from_str(&text) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!("config file {} ignored: {e}", path.display());
                FileConfig::default()
            }
        }
    }

    fn merged(mut self, file: FileConfig) -> Self {
        if let Some(analysis) = file.analysis {
            self.analysis = analysis;
        }
        if let Some(log_dir) = file.log_dir {
            self.log_dir = log_dir;
        }
        if let Some(audit) = file.audit {
            self.audit = audit;
        }
        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
        }
        self
    }

    /// Render the effective configuration for `config --show`.
    pub fn render(&self) -> String {
        format!(
            "analysis = {:?}\nlog_dir = {}\naudit = {}\nlogging.level = {}\n",
            self.analysis,
            self.log_dir.display(),
            self.audit,
            self.logging.level
        )
    }
}

fn parse_analysis(value: &str) -> Option<AnalysisMode> {
    match value.to_ascii_lowercase().as_str() {
        "inline" => Some(AnalysisMode::Inline),
        "external" => Some(AnalysisMode::External),
        _ => None,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
