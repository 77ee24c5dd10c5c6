use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::domain::{FirmwareError, Settings};
use crate::ports::SettingsStore;

/// Default settings file location.
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/fwupdate/fwupdate.toml";

/// Environment variable overriding [`DEFAULT_SETTINGS_PATH`].
pub const SETTINGS_ENV_VAR: &str = "FWUPDATE_CONFIG";

/// TOML-backed settings store.
pub struct TomlSettingsStore {
    config_path: PathBuf,
}

impl TomlSettingsStore {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Resolve the settings path: explicit override, then
    /// `FWUPDATE_CONFIG`, then [`DEFAULT_SETTINGS_PATH`].
    pub fn locate(explicit: Option<&Path>) -> Self {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| {
                std::env::var_os(SETTINGS_ENV_VAR)
                    .filter(|v| !v.is_empty())
                    .map(PathBuf::from)
            })
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));
        Self::new(path)
    }
}

impl SettingsStore for TomlSettingsStore {
    fn load(&self) -> Result<Settings, FirmwareError> {
        let config_path = self.config_path();

        if !config_path.exists() {
            debug!(path = ?config_path, "Settings file not found, using defaults");
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| FirmwareError::io(format!("reading {}", config_path.display()), e))?;
        let settings: Settings = toml::from_str(&content).map_err(|e| {
            FirmwareError::InvalidConfiguration(format!("{}: {}", config_path.display(), e))
        })?;
        info!(path = ?config_path, "Settings loaded");
        Ok(settings)
    }

    fn save(&self, settings: &Settings) -> Result<(), FirmwareError> {
        let config_path = self.config_path();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| FirmwareError::io(format!("creating {}", parent.display()), e))?;
        }

        let content = toml::to_string_pretty(settings)
            .map_err(|e| FirmwareError::InvalidConfiguration(e.to_string()))?;
        fs::write(&config_path, content)
            .map_err(|e| FirmwareError::io(format!("writing {}", config_path.display()), e))?;

        info!(path = ?config_path, "Settings saved");
        Ok(())
    }

    fn config_path(&self) -> PathBuf {
        self.config_path.clone()
    }
}
