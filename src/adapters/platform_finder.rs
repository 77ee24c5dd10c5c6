use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info};

use crate::domain::platform::UNKNOWN;
use crate::domain::validation::DATE_FORMAT;
use crate::domain::{FirmwareError, PlatformRecord};
use crate::ports::PlatformFinder;

const DMI_PATH: &str = "sys/devices/virtual/dmi";
const DMI_ID_PATH: &str = "sys/devices/virtual/dmi/id";
/// Alternative DMI attribute directory, used by test rigs when present.
const DMI_OVERRIDE_PATH: &str = "scripts/dmi_id_bios_info";
const DEVICE_TREE_PATH: &str = "proc/device-tree/firmware/bios";

const DMI_DATE_FORMATS: [&str; 2] = ["%m/%d/%Y", "%b %d %Y"];
const DEVICE_TREE_DATE_FORMAT: &str = "%b %d %Y %H:%M:%S";

/// Attribute file names for one discovery source.
struct AttributeFiles {
    release_date: &'static str,
    vendor: &'static str,
    version: &'static str,
    manufacturer: &'static str,
    product: &'static str,
}

const DMI_FILES: AttributeFiles = AttributeFiles {
    release_date: "bios_date",
    vendor: "bios_vendor",
    version: "bios_version",
    manufacturer: "sys_vendor",
    product: "product_name",
};

const DEVICE_TREE_FILES: AttributeFiles = AttributeFiles {
    release_date: "bios-release-date",
    vendor: "bios-vendor",
    version: "bios-version",
    manufacturer: "system-manufacturer",
    product: "system-product-name",
};

/// Reads platform identity from DMI, falling back to the device tree.
pub struct SysfsPlatformFinder {
    root: PathBuf,
}

impl SysfsPlatformFinder {
    pub fn new() -> Self {
        Self::with_root("/")
    }

    /// Resolve every attribute path below `root` instead of `/`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn dmi_info(&self) -> Result<PlatformRecord, FirmwareError> {
        let overridden = self.root.join(DMI_OVERRIDE_PATH);
        let dir = if overridden.is_dir() {
            overridden
        } else {
            self.root.join(DMI_ID_PATH)
        };
        debug!(dir = %dir.display(), "reading DMI attributes");

        let record = PlatformRecord {
            release_date: parse_dmi_date(&read_attribute(&dir.join(DMI_FILES.release_date), UNKNOWN)?)?,
            vendor: read_attribute(&dir.join(DMI_FILES.vendor), UNKNOWN)?,
            version: read_attribute(&dir.join(DMI_FILES.version), UNKNOWN)?,
            manufacturer: read_attribute(&dir.join(DMI_FILES.manufacturer), "")?,
            product: read_attribute(&dir.join(DMI_FILES.product), "")?,
        };

        if record.vendor == UNKNOWN || record.version == UNKNOWN {
            debug!(record = ?record, "incomplete DMI data, using defaults");
            return Ok(PlatformRecord::default());
        }
        Ok(record)
    }

    fn device_tree_info(&self) -> Result<PlatformRecord, FirmwareError> {
        let dir = self.root.join(DEVICE_TREE_PATH);
        debug!(dir = %dir.display(), "reading device tree attributes");

        Ok(PlatformRecord {
            release_date: parse_device_tree_date(&read_attribute(
                &dir.join(DEVICE_TREE_FILES.release_date),
                UNKNOWN,
            )?)?,
            vendor: read_attribute(&dir.join(DEVICE_TREE_FILES.vendor), UNKNOWN)?,
            version: read_attribute(&dir.join(DEVICE_TREE_FILES.version), UNKNOWN)?,
            manufacturer: read_attribute(&dir.join(DEVICE_TREE_FILES.manufacturer), "")?,
            product: read_attribute(&dir.join(DEVICE_TREE_FILES.product), "")?,
        })
    }
}

impl Default for SysfsPlatformFinder {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformFinder for SysfsPlatformFinder {
    fn platform_info(&self) -> Result<PlatformRecord, FirmwareError> {
        let record = if self.root.join(DMI_PATH).is_dir() {
            self.dmi_info()?
        } else {
            self.device_tree_info()?
        };

        info!(
            release_date = %record.release_date,
            vendor = %record.vendor,
            version = %record.version,
            manufacturer = %record.manufacturer,
            product = %record.product,
            "Platform information detected"
        );
        Ok(record)
    }
}

/// First line of `path`, cut at the first NUL; `default` when missing.
fn read_attribute(path: &Path, default: &str) -> Result<String, FirmwareError> {
    if !path.exists() {
        return Ok(default.to_string());
    }
    let file = fs::File::open(path).map_err(|e| {
        FirmwareError::PlatformInfo(format!("{} Error while reading the file {}", e, path.display()))
    })?;

    let mut line = Vec::new();
    BufReader::new(file).read_until(b'\n', &mut line).map_err(|e| {
        FirmwareError::PlatformInfo(format!("{} Error while reading the file {}", e, path.display()))
    })?;
    if line.last() == Some(&b'\n') {
        line.pop();
    }
    let value = line.split(|b| *b == 0).next().unwrap_or_default();
    Ok(String::from_utf8_lossy(value).into_owned())
}

fn parse_dmi_date(raw: &str) -> Result<String, FirmwareError> {
    DMI_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw.trim(), fmt).ok())
        .map(|date| date.format(DATE_FORMAT).to_string())
        .ok_or_else(|| FirmwareError::PlatformInfo("Time date does not match anything".to_string()))
}

fn parse_device_tree_date(raw: &str) -> Result<String, FirmwareError> {
    NaiveDateTime::parse_from_str(raw.trim(), DEVICE_TREE_DATE_FORMAT)
        .map(|dt| dt.date().format(DATE_FORMAT).to_string())
        .map_err(|_| {
            FirmwareError::PlatformInfo(format!(
                "Time date '{}' does not match expected format",
                raw
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_attrs(dir: &Path, attrs: &[(&str, &str)]) {
        fs::create_dir_all(dir).unwrap();
        for (name, value) in attrs {
            fs::write(dir.join(name), value).unwrap();
        }
    }

    #[test]
    fn test_reads_dmi_attributes() {
        let root = TempDir::new().unwrap();
        write_attrs(
            &root.path().join(DMI_ID_PATH),
            &[
                ("bios_date", "06/15/2022\n"),
                ("bios_vendor", "American Megatrends Inc.\n"),
                ("bios_version", "5.13\n"),
                ("sys_vendor", "Intel Corporation\n"),
                ("product_name", "Alder Lake Client Platform\n"),
            ],
        );

        let record = SysfsPlatformFinder::with_root(root.path()).platform_info().unwrap();
        assert_eq!(record.release_date, "2022-06-15");
        assert_eq!(record.vendor, "American Megatrends Inc.");
        assert_eq!(record.version, "5.13");
        assert_eq!(record.manufacturer, "Intel Corporation");
        assert_eq!(record.product, "Alder Lake Client Platform");
    }

    #[test]
    fn test_dmi_override_directory_wins() {
        let root = TempDir::new().unwrap();
        write_attrs(&root.path().join(DMI_ID_PATH), &[("bios_date", "01/01/2000")]);
        write_attrs(
            &root.path().join(DMI_OVERRIDE_PATH),
            &[
                ("bios_date", "Mar 04 2021"),
                ("bios_vendor", "Intel Corp."),
                ("bios_version", "1.0"),
            ],
        );

        let record = SysfsPlatformFinder::with_root(root.path()).platform_info().unwrap();
        assert_eq!(record.release_date, "2021-03-04");
        assert_eq!(record.manufacturer, "");
    }

    #[test]
    fn test_unknown_dmi_vendor_yields_defaults() {
        let root = TempDir::new().unwrap();
        write_attrs(
            &root.path().join(DMI_ID_PATH),
            &[("bios_date", "06/15/2022"), ("bios_version", "5.13"), ("product_name", "x")],
        );

        let record = SysfsPlatformFinder::with_root(root.path()).platform_info().unwrap();
        assert_eq!(record, PlatformRecord::default());
    }

    #[test]
    fn test_bad_dmi_date_is_platform_error() {
        let root = TempDir::new().unwrap();
        write_attrs(&root.path().join(DMI_ID_PATH), &[("bios_date", "2022.06.15")]);

        let err = SysfsPlatformFinder::with_root(root.path()).platform_info().unwrap_err();
        assert!(matches!(err, FirmwareError::PlatformInfo(_)));
    }

    #[test]
    fn test_device_tree_fallback() {
        let root = TempDir::new().unwrap();
        write_attrs(
            &root.path().join(DEVICE_TREE_PATH),
            &[
                ("bios-release-date", "Sep 12 2021 10:22:05\0"),
                ("bios-vendor", "Intel Corp.\0"),
                ("bios-version", "0.9.1\0"),
                ("system-manufacturer", "Intel Corp.\0"),
                ("system-product-name", "kmb-evm\0"),
            ],
        );

        let record = SysfsPlatformFinder::with_root(root.path()).platform_info().unwrap();
        assert_eq!(record.release_date, "2021-09-12");
        assert_eq!(record.vendor, "Intel Corp.");
        assert_eq!(record.product, "kmb-evm");
    }

    #[test]
    fn test_missing_device_tree_date_is_platform_error() {
        let root = TempDir::new().unwrap();
        let err = SysfsPlatformFinder::with_root(root.path()).platform_info().unwrap_err();
        assert!(err.to_string().contains("does not match expected format"));
    }
}
