//! Caller input checks, run before anything touches the filesystem or
//! spawns a process.

use std::path::Path;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::debug;

use super::error::FirmwareError;
use super::host::HostOs;

/// Free-text fields must be strictly shorter than this.
pub const MAX_STRING_CHARS: usize = 50;
/// Package paths may be at most this long.
pub const MAX_PATH_CHARS: usize = 500;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

const USER_STRING_PATTERN: &str = r"^[a-zA-Z0-9.()+, _-]+$";
const GUID_PATTERN: &str = r"^[{]?[0-9a-fA-F]{8}-([0-9a-fA-F]{4}-){3}[0-9a-fA-F]{12}[}]?$";
const LINUX_PATH_PATTERN: &str = r"^(/[^/\x00]+)+$";

pub const GUID_FORMAT_MESSAGE: &str = "GUID should be 36 characters displayed in five groups \
in the format XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX.";

static USER_STRING_RE: OnceLock<Regex> = OnceLock::new();
static GUID_RE: OnceLock<Regex> = OnceLock::new();
static LINUX_PATH_RE: OnceLock<Regex> = OnceLock::new();

fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> Result<&'static Regex, FirmwareError> {
    if let Some(re) = cell.get() {
        return Ok(re);
    }
    let re = Regex::new(pattern)
        .map_err(|e| FirmwareError::InvalidInput(format!("bad validation pattern: {}", e)))?;
    Ok(cell.get_or_init(|| re))
}

/// Check a vendor/manufacturer/product string. `None` and `""` pass.
pub fn validate_user_string(value: Option<&str>, param_name: &str) -> Result<(), FirmwareError> {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return Ok(());
    };

    if value.chars().count() >= MAX_STRING_CHARS {
        return Err(FirmwareError::InvalidInput(format!(
            "{} is too long.  Must be less than {} characters",
            param_name, MAX_STRING_CHARS
        )));
    }
    if !compiled(&USER_STRING_RE, USER_STRING_PATTERN)?.is_match(value) {
        return Err(FirmwareError::InvalidInput(format!(
            "Invalid character in {}",
            param_name
        )));
    }

    debug!(param = param_name, "user input string passed checks");
    Ok(())
}

/// Parse `YYYY-MM-DD` and return it in canonical form.
///
/// Surrounding or embedded whitespace is rejected; chrono would otherwise
/// skip it before numeric fields.
pub fn validate_release_date(release_date: &str) -> Result<String, FirmwareError> {
    let mismatch = |detail: String| {
        FirmwareError::InvalidInput(format!(
            "time data '{}' does not match format '{}': {}",
            release_date, DATE_FORMAT, detail
        ))
    };
    if release_date.chars().any(char::is_whitespace) {
        return Err(mismatch("unexpected whitespace".to_string()));
    }
    NaiveDate::parse_from_str(release_date, DATE_FORMAT)
        .map(|date| date.format(DATE_FORMAT).to_string())
        .map_err(|e| mismatch(e.to_string()))
}

/// Check an optional device identifier. A valid value is returned unchanged.
pub fn validate_guid(value: Option<&str>) -> Result<Option<String>, FirmwareError> {
    match value.filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(guid) if compiled(&GUID_RE, GUID_PATTERN)?.is_match(guid) => Ok(Some(guid.to_string())),
        Some(_) => Err(FirmwareError::InvalidInput(GUID_FORMAT_MESSAGE.to_string())),
    }
}

/// Check that `package_path` names an existing regular file that is not a
/// symbolic link.
///
/// The symlink check runs last so a missing path and a symlinked path are
/// reported through different error kinds.
pub fn validate_package_path(package_path: &str, host_os: HostOs) -> Result<(), FirmwareError> {
    if package_path.chars().count() > MAX_PATH_CHARS {
        return Err(FirmwareError::InvalidInput(format!(
            "Capsule Path is too long.  Must be less than {} characters",
            MAX_PATH_CHARS
        )));
    }

    match host_os {
        HostOs::Linux => {
            if !compiled(&LINUX_PATH_RE, LINUX_PATH_PATTERN)?.is_match(package_path) {
                return Err(FirmwareError::InvalidInput(
                    "Invalid Linux path format".to_string(),
                ));
            }
        }
    }

    let path = Path::new(package_path);
    if path.is_dir() {
        return Err(FirmwareError::InvalidInput(format!(
            "Invalid Path.  Path needs to be a file: {}",
            package_path
        )));
    }
    // follows links, so a dangling link is reported as missing
    if !path.exists() {
        return Err(FirmwareError::InvalidInput(format!(
            "Path to file does not exist: {}",
            package_path
        )));
    }
    if is_symlink(path) {
        return Err(FirmwareError::SymlinkRejected(path.to_path_buf()));
    }
    Ok(())
}

fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false)
}

/// HTML-escape a configuration value and strip NUL bytes.
pub fn clean_input(value: &str) -> String {
    let mut cleaned = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => cleaned.push_str("&amp;"),
            '<' => cleaned.push_str("&lt;"),
            '>' => cleaned.push_str("&gt;"),
            '"' => cleaned.push_str("&quot;"),
            '\'' => cleaned.push_str("&#x27;"),
            '\0' => {}
            other => cleaned.push(other),
        }
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_user_string_accepts_allowed_characters() {
        assert!(validate_user_string(Some("Intel Corp. (R), v1.0+_-"), "BIOS Vendor").is_ok());
        assert!(validate_user_string(None, "BIOS Vendor").is_ok());
        assert!(validate_user_string(Some(""), "BIOS Vendor").is_ok());
    }

    #[test]
    fn test_user_string_length_limit() {
        let at_limit = "a".repeat(MAX_STRING_CHARS);
        let err = validate_user_string(Some(&at_limit), "Manufacturer").unwrap_err();
        assert!(err.to_string().contains("Manufacturer is too long"));

        let below = "a".repeat(MAX_STRING_CHARS - 1);
        assert!(validate_user_string(Some(&below), "Manufacturer").is_ok());
    }

    #[test]
    fn test_user_string_rejects_shell_characters() {
        for bad in ["Intel; rm -rf /", "a|b", "$(id)", "x`y`", "name\n"] {
            let err = validate_user_string(Some(bad), "Platform Name").unwrap_err();
            assert_eq!(err.to_string(), "Invalid character in Platform Name");
        }
    }

    #[test]
    fn test_release_date_round_trip() {
        for date in ["2022-01-31", "1999-12-01", "2024-02-29"] {
            assert_eq!(validate_release_date(date).unwrap(), date);
        }
        let once = validate_release_date("2021-07-04").unwrap();
        assert_eq!(validate_release_date(&once).unwrap(), once);
    }

    #[test]
    fn test_release_date_rejects_other_formats() {
        for bad in [
            "01/31/2022",
            "2022-13-01",
            "2023-02-29",
            "yesterday",
            "",
            " 2022-01-01 ",
            " 2022-01-01",
            "2022- 01-01",
            "2022-01-01\n",
        ] {
            assert!(validate_release_date(bad).is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn test_guid_validation() {
        let plain = "6B29FC40-CA47-1067-B31D-00DD010662DA";
        let braced = "{6b29fc40-ca47-1067-b31d-00dd010662da}";
        assert_eq!(validate_guid(Some(plain)).unwrap().as_deref(), Some(plain));
        assert_eq!(validate_guid(Some(braced)).unwrap().as_deref(), Some(braced));
        assert_eq!(validate_guid(None).unwrap(), None);

        for bad in [
            "6B29FC40-CA47-1067-B31D",
            "6B29FC40CA471067B31D00DD010662DA",
            "ZB29FC40-CA47-1067-B31D-00DD010662DA",
            "6B29FC40-CA47-1067-B31D-00DD010662DA0",
        ] {
            let err = validate_guid(Some(bad)).unwrap_err();
            assert_eq!(err.to_string(), GUID_FORMAT_MESSAGE);
        }
    }

    #[test]
    fn test_path_validation_accepts_regular_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("capsule.bin");
        std::fs::write(&file, b"capsule").unwrap();
        assert!(validate_package_path(file.to_str().unwrap(), HostOs::Linux).is_ok());
    }

    #[test]
    fn test_path_validation_rejects_bad_shapes() {
        for bad in ["relative/capsule.bin", "capsule.bin", "/tmp//x", "/tmp/x/", ""] {
            let err = validate_package_path(bad, HostOs::Linux).unwrap_err();
            assert!(matches!(err, FirmwareError::InvalidInput(_)), "{bad}");
        }
        let long = format!("/{}", "a".repeat(MAX_PATH_CHARS));
        let err = validate_package_path(&long, HostOs::Linux).unwrap_err();
        assert!(err.to_string().contains("too long"));
    }

    #[test]
    fn test_path_validation_rejects_directory_and_missing() {
        let dir = TempDir::new().unwrap();
        let err = validate_package_path(dir.path().to_str().unwrap(), HostOs::Linux).unwrap_err();
        assert!(err.to_string().contains("Path needs to be a file"));

        let missing = dir.path().join("missing.bin");
        let err = validate_package_path(missing.to_str().unwrap(), HostOs::Linux).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_path_validation_rejects_symlink() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("real.bin");
        std::fs::write(&target, b"capsule").unwrap();
        let link = dir.path().join("link.bin");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let err = validate_package_path(link.to_str().unwrap(), HostOs::Linux).unwrap_err();
        assert!(matches!(err, FirmwareError::SymlinkRejected(_)));
    }

    #[test]
    fn test_path_validation_reports_dangling_symlink_as_missing() {
        let dir = TempDir::new().unwrap();
        let link = dir.path().join("gone.bin");
        std::os::unix::fs::symlink(dir.path().join("removed.bin"), &link).unwrap();

        let err = validate_package_path(link.to_str().unwrap(), HostOs::Linux).unwrap_err();
        assert!(matches!(err, FirmwareError::InvalidInput(_)));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_clean_input() {
        assert_eq!(clean_input("<a href='x'>&\"</a>"), "&lt;a href=&#x27;x&#x27;&gt;&amp;&quot;&lt;/a&gt;");
        assert_eq!(clean_input("abc\0def"), "abcdef");
        assert_eq!(clean_input("/opt/afulnx/afulnx_64"), "/opt/afulnx/afulnx_64");
    }
}
