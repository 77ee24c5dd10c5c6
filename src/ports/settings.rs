use std::path::PathBuf;

use crate::domain::{FirmwareError, Settings};

/// Port for loading and persisting tool settings.
pub trait SettingsStore: Send + Sync {
    /// Load settings. A missing file yields defaults and writes nothing.
    fn load(&self) -> Result<Settings, FirmwareError>;

    /// Write settings, creating parent directories as needed.
    fn save(&self, settings: &Settings) -> Result<(), FirmwareError>;

    /// Path of the settings file.
    fn config_path(&self) -> PathBuf;
}
