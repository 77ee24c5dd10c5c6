use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Coarse classification of a [`FirmwareError`].
///
/// The orchestrator uses this (together with the stage that failed) to pick
/// an outcome code; callers can match on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed, oversized or unsafe caller input.
    Validation,
    /// Symlink substitution or another policy violation. Never retried.
    Security,
    /// Schema/parse failure, unknown platform or malformed record.
    Configuration,
    /// The capsule is not eligible for this platform.
    Eligibility,
    /// Subprocess or filesystem failure while acting on the host.
    Execution,
    /// Unsupported host OS or platform discovery failure.
    Environment,
}

/// Why the eligibility check refused a capsule.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    #[error("BIOS is not upgradable. Reason: Capsule Manufacturer and Platform Manufacturer do not match.")]
    ManufacturerMismatch,

    #[error("BIOS is not upgradable. Reason: Capsule Product Name and Platform Product Name do not match.")]
    ProductMismatch,

    #[error("BIOS is not upgradable. Reason: Capsule Vendor and Platform Vendor do not match.")]
    VendorMismatch,

    #[error("Issue converting date to datetime object")]
    InvalidReleaseDate,

    #[error("Firmware Update Aborted as this package has already been applied.")]
    AlreadyApplied,

    #[error("Firmware Update Aborted: Capsule release date is before platform release date")]
    OlderThanInstalled,
}

/// Failures of the guarded file move.
#[derive(Error, Debug)]
pub enum MoveError {
    #[error("File does not exist or file path is not to a file: {}", .0.display())]
    NotRegularFile(PathBuf),

    #[error("Security error: Source file is a symlink: {}", .0.display())]
    SourceSymlink(PathBuf),

    #[error("Security error: Destination is a symlink: {}", .0.display())]
    DestinationSymlink(PathBuf),

    #[error("Error while moving file {} to {}", .from.display(), .to.display())]
    Failed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Domain-level errors for the firmware update pipeline.
#[derive(Error, Debug)]
pub enum FirmwareError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Path is a symbolic link: {}", .0.display())]
    SymlinkRejected(PathBuf),

    #[error("Unsupported OS type: {0}")]
    UnsupportedOs(String),

    #[error("Unable to get platform information: {0}")]
    PlatformInfo(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("XML parser timed out after {0:?}")]
    ParserTimeout(Duration),

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Empty tag encountered: <{0}>. XML rejected")]
    EmptyTag(String),

    #[error(transparent)]
    Ineligible(#[from] Denial),

    #[error("{0}")]
    Install(String),

    #[error(transparent)]
    Move(#[from] MoveError),

    #[error("command execution failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Firmware Update Aborted: Reboot Failed: {0}")]
    Reboot(String),

    #[error("io error during {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

impl FirmwareError {
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        FirmwareError::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        FirmwareError::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FirmwareError::InvalidInput(_) => ErrorKind::Validation,
            FirmwareError::SymlinkRejected(_) => ErrorKind::Security,
            FirmwareError::UnsupportedOs(_) | FirmwareError::PlatformInfo(_) => {
                ErrorKind::Environment
            }
            FirmwareError::InvalidConfiguration(_)
            | FirmwareError::ParserTimeout(_)
            | FirmwareError::UnsupportedPlatform(_)
            | FirmwareError::EmptyTag(_) => ErrorKind::Configuration,
            FirmwareError::Ineligible(_) => ErrorKind::Eligibility,
            FirmwareError::Move(MoveError::SourceSymlink(_))
            | FirmwareError::Move(MoveError::DestinationSymlink(_)) => ErrorKind::Security,
            FirmwareError::Install(_)
            | FirmwareError::Move(_)
            | FirmwareError::CommandFailed { .. }
            | FirmwareError::Reboot(_)
            | FirmwareError::Io { .. } => ErrorKind::Execution,
        }
    }
}
