pub mod eligibility;
pub mod error;
pub mod host;
pub mod outcome;
pub mod platform;
pub mod settings;
pub mod update;
pub mod validation;

pub use error::{Denial, ErrorKind, FirmwareError, MoveError};
pub use host::{HostEnvironment, HostOs};
pub use outcome::Outcome;
pub use platform::{PlatformRecord, QueryResponse, QueryScope};
pub use settings::Settings;
pub use update::{ConfigRecord, HashAlgorithm, InstallMethod};
