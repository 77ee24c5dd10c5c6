use crate::domain::{FirmwareError, PlatformRecord};

/// Port for discovering the installed firmware and platform identity.
pub trait PlatformFinder: Send + Sync {
    /// Read a fresh snapshot of the host's platform attributes.
    fn platform_info(&self) -> Result<PlatformRecord, FirmwareError>;
}
