pub mod file_mover;
pub mod installer;
pub mod package_digest;
pub mod platform_finder;
pub mod rebooter;
pub mod schema;
pub mod settings_store;
pub mod shell_runner;
pub mod xml_config;

pub use installer::InstallDispatcher;
pub use platform_finder::SysfsPlatformFinder;
pub use rebooter::Rebooter;
pub use settings_store::TomlSettingsStore;
pub use shell_runner::SecureCommandRunner;
pub use xml_config::{ConfigSource, XmlConfigStore};
