pub mod updater;

pub use updater::{FirmwareUpdater, Stage, UpdateRequest};
