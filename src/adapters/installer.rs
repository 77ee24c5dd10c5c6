//! Applies a firmware package using the strategy its platform record calls
//! for: running the vendor tool, or placing a firmware-volume file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::file_mover::{canonical_path, move_file};
use super::shell_runner::AFULNX_64;
use crate::domain::{ConfigRecord, FirmwareError, HostEnvironment, InstallMethod};
use crate::ports::{CommandOutput, CommandRunner};

const GUID_MARKERS: [&str; 2] = ["System Firmware type", "system-firmware type"];
const GENERIC_TOOL_FAILURE: &str = "Firmware command failed";

/// Installs a package according to a [`ConfigRecord`].
pub struct InstallDispatcher {
    runner: Arc<dyn CommandRunner>,
    host: HostEnvironment,
}

impl InstallDispatcher {
    pub fn new(runner: Arc<dyn CommandRunner>, host: HostEnvironment) -> Self {
        Self { runner, host }
    }

    /// Install the package at `package_path`.
    pub fn install(&self, package_path: &Path, record: &ConfigRecord) -> Result<(), FirmwareError> {
        if record.platform.product.is_empty() {
            return Err(FirmwareError::Install("Platform product unspecified.".to_string()));
        }

        let file_name = package_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                FirmwareError::InvalidInput(format!(
                    "package path has no file name: {}",
                    package_path.display()
                ))
            })?;
        let repo_dir = canonical_path(package_path.parent().unwrap_or(Path::new("/")));

        match record.install_method() {
            InstallMethod::Tool { tool_path } => {
                self.install_with_tool(tool_path, record, &repo_dir.join(file_name))
            }
            InstallMethod::File { destination } => {
                Self::install_file(destination, &repo_dir, file_name)
            }
        }
    }

    fn run_tool(&self, command: &str) -> Result<CommandOutput, FirmwareError> {
        self.runner.run(&self.host.wrap(command), None)
    }

    fn install_with_tool(
        &self,
        tool_path: &str,
        record: &ConfigRecord,
        package: &Path,
    ) -> Result<(), FirmwareError> {
        if tool_path.is_empty() {
            return Err(FirmwareError::Install(
                "Firmware Update Aborted: No firmware tool configured".to_string(),
            ));
        }
        if tool_path.contains('/') && !self.runner.tool_exists(Path::new(tool_path)) {
            return Err(FirmwareError::Install(format!(
                "Firmware Update Aborted: Firmware tool does not exist at {}",
                tool_path
            )));
        }

        if let Some(check_args) = record.tool_check_args.as_deref() {
            let output = self.run_tool(&format!("{} {}", tool_path, check_args))?;
            if !output.success() {
                return Err(FirmwareError::Install(format!(
                    "Firmware Update Aborted: Firmware tool: {}",
                    failure_message(&output)
                )));
            }
        }

        let guid = match (record.guid_required, record.guid.as_deref()) {
            (false, _) => None,
            (true, Some(guid)) => Some(guid.to_string()),
            (true, None) => Some(self.extract_guid(tool_path)?),
        };

        let package = package.to_str().ok_or_else(|| {
            FirmwareError::InvalidInput(format!("package path is not UTF-8: {}", package.display()))
        })?;
        let quoted_package = shlex::try_quote(package).map_err(|e| {
            FirmwareError::InvalidInput(format!("cannot quote package path {}: {}", package, e))
        })?;

        let command = [
            Some(tool_path),
            record.tool_args.as_deref(),
            guid.as_deref(),
            Some(&*quoted_package),
            record.tool_options.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
        info!(command = %command, "firmware command");

        if Path::new(tool_path).file_name().and_then(|n| n.to_str()) == Some(AFULNX_64) {
            info!("Device will reboot upon successful firmware install.");
        }

        let output = self.run_tool(&command)?;
        if output.success() {
            info!("Apply firmware command successful.");
            Ok(())
        } else {
            debug!(stdout = %output.stdout, stderr = %output.stderr, code = output.code, "firmware command failed");
            Err(FirmwareError::Install(failure_message(&output)))
        }
    }

    /// Ask the tool for its firmware resources and pick the system firmware GUID.
    fn extract_guid(&self, tool_path: &str) -> Result<String, FirmwareError> {
        let output = self.run_tool(&format!("{} -l", tool_path))?;
        if !output.success() {
            return Err(FirmwareError::Install(format!(
                "Firmware Update Aborted: failed to list GUIDs: {}",
                output.stderr.trim()
            )));
        }
        let guid = parse_guid(&output.stdout).ok_or_else(|| {
            FirmwareError::Install(
                "Firmware Update Aborted: No System Firmware type GUID found".to_string(),
            )
        })?;
        debug!(guid = %guid, "discovered firmware GUID");
        Ok(guid)
    }

    fn install_file(destination: &str, repo_dir: &Path, file_name: &str) -> Result<(), FirmwareError> {
        if destination.is_empty() {
            return Err(FirmwareError::Install(
                "Firmware destination is required.".to_string(),
            ));
        }

        let source = repo_dir.join(firmware_volume_name(file_name));
        debug!(source = %source.display(), destination, "placing firmware volume");
        let target: PathBuf = move_file(&source, Path::new(destination)).map_err(|e| {
            debug!("Firmware Update Aborted: File copy to path failed: {}", e);
            FirmwareError::from(e)
        })?;

        debug!(target = %target.display(), "firmware volume moved");
        Ok(())
    }
}

fn failure_message(output: &CommandOutput) -> String {
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        GENERIC_TOOL_FAILURE.to_string()
    } else {
        stderr.to_string()
    }
}

/// The package's sibling firmware-volume file: last three characters of the
/// name replaced by `fv`.
pub fn firmware_volume_name(package_file: &str) -> String {
    let cut = package_file
        .char_indices()
        .rev()
        .nth(2)
        .map(|(index, _)| index)
        .unwrap_or(0);
    format!("{}fv", &package_file[..cut])
}

/// GUID on the first listing line carrying a system firmware marker.
pub fn parse_guid(listing: &str) -> Option<String> {
    listing
        .lines()
        .filter(|line| GUID_MARKERS.iter().any(|marker| line.contains(marker)))
        .find_map(|line| {
            let token = line.split(',').nth(1)?.split_whitespace().next()?;
            let guid = token.trim_start_matches('{').trim_end_matches('}');
            (!guid.is_empty()).then(|| guid.to_string())
        })
}
