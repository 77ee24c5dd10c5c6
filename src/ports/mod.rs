pub mod command;
pub mod platform;
pub mod settings;

pub use command::{CommandOutput, CommandRunner};
pub use platform::PlatformFinder;
pub use settings::SettingsStore;
