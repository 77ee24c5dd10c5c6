use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Placeholder used when a platform attribute could not be read.
pub const UNKNOWN: &str = "Unknown";

/// Identity and firmware state of a host, or of a capsule targeting one.
///
/// Both the currently installed firmware and the candidate capsule use this
/// shape. Records are built fresh for every pipeline run and never mutated
/// once handed to a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformRecord {
    /// BIOS release date, `YYYY-MM-DD` or [`UNKNOWN`].
    pub release_date: String,
    /// BIOS vendor.
    pub vendor: String,
    /// BIOS version.
    pub version: String,
    /// Platform manufacturer.
    pub manufacturer: String,
    /// Platform product name. Also the key into the platform configuration.
    pub product: String,
}

impl Default for PlatformRecord {
    fn default() -> Self {
        Self {
            release_date: UNKNOWN.to_string(),
            vendor: UNKNOWN.to_string(),
            version: UNKNOWN.to_string(),
            manufacturer: String::new(),
            product: String::new(),
        }
    }
}

/// Which platform attributes a query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryScope {
    /// Firmware: release date, vendor and version.
    Fw,
    /// Hardware: manufacturer and product.
    Hw,
    /// Everything.
    #[default]
    All,
}

impl FromStr for QueryScope {
    type Err = std::convert::Infallible;

    /// Case-insensitive; anything unrecognised means [`QueryScope::All`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "FW" => QueryScope::Fw,
            "HW" => QueryScope::Hw,
            _ => QueryScope::All,
        })
    }
}

impl fmt::Display for QueryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryScope::Fw => write!(f, "fw"),
            QueryScope::Hw => write!(f, "hw"),
            QueryScope::All => write!(f, "all"),
        }
    }
}

/// Platform attributes selected by a [`QueryScope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bios_release_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bios_vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bios_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_name: Option<String>,
}

impl QueryResponse {
    pub fn new(scope: QueryScope, platform: &PlatformRecord) -> Self {
        let fw = matches!(scope, QueryScope::Fw | QueryScope::All);
        let hw = matches!(scope, QueryScope::Hw | QueryScope::All);
        let pick = |wanted: bool, value: &String| wanted.then(|| value.clone());

        Self {
            bios_release_date: pick(fw, &platform.release_date),
            bios_vendor: pick(fw, &platform.vendor),
            bios_version: pick(fw, &platform.version),
            manufacturer: pick(hw, &platform.manufacturer),
            platform_name: pick(hw, &platform.product),
        }
    }
}
