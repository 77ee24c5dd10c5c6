use std::fmt;

use serde::Serialize;

/// Result of an update or query request: a stable status code and message.
///
/// Codes are part of the public contract and never change between releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Outcome {
    pub status: u16,
    pub message: &'static str,
}

impl Outcome {
    const fn new(status: u16, message: &'static str) -> Self {
        Self { status, message }
    }

    /// True for the 2xx outcomes.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// JSON form: `{"status":200,"message":"SUCCESSFUL INSTALL"}`.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"status":{},"message":"{}"}}"#, self.status, self.message)
        })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json())
    }
}

pub const INSTALL_SUCCESS: Outcome = Outcome::new(200, "SUCCESSFUL INSTALL");
pub const QUERY_SUCCESS: Outcome = Outcome::new(200, "SUCCESSFUL QUERY");

pub const INPUT_VALIDATION_FAILURE: Outcome =
    Outcome::new(400, "FIRMWARE INPUT VALIDATION FAILURE");
pub const UNABLE_TO_GET_PLATFORM_INFO_FAILURE: Outcome =
    Outcome::new(404, "UNABLE TO GET PLATFORM INFORMATION");
pub const UNABLE_FIND_MATCHING_PLATFORM: Outcome =
    Outcome::new(404, "UNABLE TO FIND MATCHING PLATFORM IN CONFIGURATION FILE");
pub const UPGRADE_CHECK_FAILURE: Outcome = Outcome::new(
    412,
    "PRE-CHECK OF SYSTEM INFORMATION FAILED.  DOES NOT MEET CRITERIA FOR FIRMWARE UPGRADE",
);
pub const INSTALL_FAILURE: Outcome = Outcome::new(500, "INSTALL FAILED");
pub const REBOOT_FAILURE: Outcome = Outcome::new(500, "REBOOT FAILED");
pub const UNSUPPORTED_OS_FAILURE: Outcome = Outcome::new(501, "UNSUPPORTED OS");
