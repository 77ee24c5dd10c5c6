use std::fmt;
use std::str::FromStr;

use super::error::FirmwareError;
use super::platform::PlatformRecord;

/// Per-platform installation directives resolved from the platform
/// configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigRecord {
    /// Platform this record was resolved against.
    pub platform: PlatformRecord,
    /// Firmware file type declared by the configuration (informational).
    pub file_type: Option<String>,
    /// Firmware tool: an absolute path, or a bare name resolved at run time.
    pub tool_path: Option<String>,
    /// Arguments placed before the device identifier in the apply command.
    pub tool_args: Option<String>,
    /// Arguments for the pre-flight invocation of the tool.
    pub tool_check_args: Option<String>,
    /// Options appended after the package path in the apply command.
    pub tool_options: Option<String>,
    /// Destination for file-based installs.
    pub firmware_destination: Option<String>,
    /// Tool needs a device identifier (GUID) on its command line.
    pub guid_required: bool,
    /// Device identifier supplied by the caller, if any.
    pub guid: Option<String>,
}

/// How a package gets onto the firmware.
///
/// Chosen purely from the shape of a [`ConfigRecord`]: a destination path
/// means file placement, anything else means invoking a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMethod<'a> {
    /// Run the vendor tool against the package.
    Tool { tool_path: &'a str },
    /// Move the package's firmware-volume file to a fixed destination.
    File { destination: &'a str },
}

impl ConfigRecord {
    pub fn install_method(&self) -> InstallMethod<'_> {
        match self.firmware_destination.as_deref() {
            Some(destination) => InstallMethod::File { destination },
            None => InstallMethod::Tool {
                tool_path: self.tool_path.as_deref().unwrap_or_default(),
            },
        }
    }
}

/// Digest algorithm for the optional package fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha384,
    Sha512,
}

impl FromStr for HashAlgorithm {
    type Err = FirmwareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "384" | "sha384" => Ok(HashAlgorithm::Sha384),
            "512" | "sha512" => Ok(HashAlgorithm::Sha512),
            other => Err(FirmwareError::InvalidInput(format!(
                "Unsupported hash algorithm '{}'. Supported values are 384 and 512",
                other
            ))),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Sha384 => write!(f, "sha384"),
            HashAlgorithm::Sha512 => write!(f, "sha512"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_selects_file_method() {
        let record = ConfigRecord {
            firmware_destination: Some("/boot/efi/".to_string()),
            tool_path: Some("/usr/sbin/movisoc-fwu".to_string()),
            ..ConfigRecord::default()
        };
        assert_eq!(
            record.install_method(),
            InstallMethod::File {
                destination: "/boot/efi/"
            }
        );
    }

    #[test]
    fn test_missing_destination_selects_tool_method() {
        let record = ConfigRecord {
            tool_path: Some("UpdateBIOS.sh".to_string()),
            ..ConfigRecord::default()
        };
        assert_eq!(
            record.install_method(),
            InstallMethod::Tool {
                tool_path: "UpdateBIOS.sh"
            }
        );
    }

    #[test]
    fn test_hash_algorithm_parsing() {
        assert_eq!("384".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha384);
        assert_eq!("SHA512".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha512);
        assert!("256".parse::<HashAlgorithm>().is_err());
    }
}
