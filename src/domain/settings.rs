use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_FIRMWARE_INFO: &str = "/usr/share/fwupdate/firmware_info.db";
pub const DEFAULT_FIRMWARE_SCHEMA: &str = "/usr/share/fwupdate/firmware_schema.xsd";
pub const DEFAULT_LOGS_DIR: &str = "/var/log/fwupdate";

/// Locations of the platform configuration document and its schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSettings {
    /// Platform configuration document (XML).
    pub firmware_info: PathBuf,
    /// Schema the document is validated against (XSD).
    pub firmware_schema: PathBuf,
}

impl Default for PathsSettings {
    fn default() -> Self {
        Self {
            firmware_info: PathBuf::from(DEFAULT_FIRMWARE_INFO),
            firmware_schema: PathBuf::from(DEFAULT_FIRMWARE_SCHEMA),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Also write daily-rotated JSON logs to `logs_dir`.
    pub file_logging: bool,
    pub logs_dir: PathBuf,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: false,
            logs_dir: PathBuf::from(DEFAULT_LOGS_DIR),
        }
    }
}

/// Tool settings, loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathsSettings,
    pub logging: LoggingSettings,
}
