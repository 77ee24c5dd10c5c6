use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

use crate::adapters::installer::InstallDispatcher;
use crate::adapters::package_digest::package_digest;
use crate::adapters::rebooter::{Rebooter, REBOOT_DELAY};
use crate::adapters::xml_config::{ConfigSource, XmlConfigStore};
use crate::adapters::{SecureCommandRunner, SysfsPlatformFinder};
use crate::domain::eligibility::check_eligible;
use crate::domain::outcome::{self, Outcome};
use crate::domain::settings::PathsSettings;
use crate::domain::validation::{
    validate_guid, validate_package_path, validate_release_date, validate_user_string, DATE_FORMAT,
};
use crate::domain::{
    FirmwareError, HashAlgorithm, HostEnvironment, HostOs, PlatformRecord, QueryResponse,
    QueryScope,
};
use crate::ports::{CommandRunner, PlatformFinder};

/// Pipeline stages, in order. A failure in any stage ends the run with that
/// stage's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CheckingHost,
    ValidatingInput,
    DetectingPlatform,
    ResolvingConfig,
    CheckingEligibility,
    Installing,
    SchedulingReboot,
}

impl Stage {
    pub fn failure_outcome(self) -> Outcome {
        match self {
            Stage::CheckingHost => outcome::UNSUPPORTED_OS_FAILURE,
            Stage::ValidatingInput => outcome::INPUT_VALIDATION_FAILURE,
            Stage::DetectingPlatform => outcome::UNABLE_TO_GET_PLATFORM_INFO_FAILURE,
            Stage::ResolvingConfig => outcome::UNABLE_FIND_MATCHING_PLATFORM,
            Stage::CheckingEligibility => outcome::UPGRADE_CHECK_FAILURE,
            Stage::Installing => outcome::INSTALL_FAILURE,
            Stage::SchedulingReboot => outcome::REBOOT_FAILURE,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::CheckingHost => "checking_host",
            Stage::ValidatingInput => "validating_input",
            Stage::DetectingPlatform => "detecting_platform",
            Stage::ResolvingConfig => "resolving_config",
            Stage::CheckingEligibility => "checking_eligibility",
            Stage::Installing => "installing",
            Stage::SchedulingReboot => "scheduling_reboot",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct StageFailure {
    stage: Stage,
    error: FirmwareError,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, StageFailure>;
}

impl<T, E: Into<FirmwareError>> AtStage<T> for Result<T, E> {
    fn at(self, stage: Stage) -> Result<T, StageFailure> {
        self.map_err(|e| StageFailure {
            stage,
            error: e.into(),
        })
    }
}

/// A request to apply one firmware package.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    /// Absolute path of the package.
    pub package_path: String,
    /// Capsule release date, `YYYY-MM-DD`. Defaults to today.
    pub release_date: Option<String>,
    pub vendor: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    /// Device identifier for tools that need one.
    pub guid: Option<String>,
    /// Take vendor, manufacturer and product from the running platform.
    pub autofill: bool,
    /// Log a digest of the package before installing.
    pub hash_algorithm: Option<HashAlgorithm>,
}

/// Capsule fields after validation.
struct ValidatedRequest {
    package_path: PathBuf,
    release_date: String,
    guid: Option<String>,
    /// `None` when the capsule identity comes from the platform.
    capsule: Option<PlatformRecord>,
}

/// Runs the firmware update and query pipelines.
pub struct FirmwareUpdater {
    paths: PathsSettings,
    platform_finder: Arc<dyn PlatformFinder>,
    runner: Arc<dyn CommandRunner>,
    host: Option<HostEnvironment>,
    pending_reboot: Mutex<Option<JoinHandle<()>>>,
}

impl FirmwareUpdater {
    pub fn new(
        paths: PathsSettings,
        platform_finder: Arc<dyn PlatformFinder>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            paths,
            platform_finder,
            runner,
            host: None,
            pending_reboot: Mutex::new(None),
        }
    }

    /// Updater wired to the real host: sysfs discovery and subprocesses.
    pub fn system(paths: PathsSettings) -> Self {
        Self::new(
            paths,
            Arc::new(SysfsPlatformFinder::new()),
            Arc::new(SecureCommandRunner::new()),
        )
    }

    /// Use `host` instead of detecting the environment on every call.
    pub fn with_host(mut self, host: HostEnvironment) -> Self {
        self.host = Some(host);
        self
    }

    fn host(&self) -> Result<HostEnvironment, FirmwareError> {
        match self.host {
            Some(host) => Ok(host),
            None => HostEnvironment::detect(),
        }
    }

    /// Validate, check and install a package, then schedule a reboot.
    pub async fn update(&self, request: UpdateRequest) -> Outcome {
        let span = info_span!("firmware_update", package = %request.package_path);
        async {
            match self.run_update(request).await {
                Ok(()) => {
                    info!("Firmware update successful");
                    outcome::INSTALL_SUCCESS
                }
                Err(failure) => Self::report(failure),
            }
        }
        .instrument(span)
        .await
    }

    fn report(failure: StageFailure) -> Outcome {
        let result = failure.stage.failure_outcome();
        error!(
            stage = %failure.stage,
            kind = ?failure.error.kind(),
            status = result.status,
            "ERROR: {}",
            failure.error
        );
        result
    }

    async fn run_update(&self, request: UpdateRequest) -> Result<(), StageFailure> {
        info!(stage = %Stage::CheckingHost, "entering stage");
        let host = self.host().at(Stage::CheckingHost)?;

        info!(stage = %Stage::ValidatingInput, "entering stage");
        let validated = validate_request(&request, host.os).at(Stage::ValidatingInput)?;

        info!(stage = %Stage::DetectingPlatform, "entering stage");
        let current = self
            .platform_finder
            .platform_info()
            .at(Stage::DetectingPlatform)?;
        let capsule = validated.capsule.clone().unwrap_or_else(|| PlatformRecord {
            release_date: validated.release_date.clone(),
            vendor: current.vendor.clone(),
            manufacturer: current.manufacturer.clone(),
            product: current.product.clone(),
            ..PlatformRecord::default()
        });

        info!(stage = %Stage::ResolvingConfig, "entering stage");
        let store = XmlConfigStore::load(
            ConfigSource::File(self.paths.firmware_info.clone()),
            &self.paths.firmware_schema,
        )
        .await
        .at(Stage::ResolvingConfig)?;
        let mut record = store.lookup(&current).at(Stage::ResolvingConfig)?;
        record.guid = validated.guid.clone();

        info!(stage = %Stage::CheckingEligibility, "entering stage");
        check_eligible(&current, &capsule).at(Stage::CheckingEligibility)?;

        info!(stage = %Stage::Installing, "entering stage");
        let dispatcher = InstallDispatcher::new(Arc::clone(&self.runner), host);
        let package_path = validated.package_path;
        let hash_algorithm = request.hash_algorithm;
        tokio::task::spawn_blocking(move || {
            if let Some(algorithm) = hash_algorithm {
                match package_digest(&package_path, algorithm) {
                    Ok(digest) => info!(%algorithm, %digest, "package digest"),
                    Err(e) => warn!(error = %e, "could not compute package digest"),
                }
            }
            dispatcher.install(&package_path, &record)
        })
        .await
        .map_err(|e| FirmwareError::Install(format!("install task failed: {}", e)))
        .and_then(|result| result)
        .at(Stage::Installing)?;

        info!(stage = %Stage::SchedulingReboot, "entering stage");
        let rebooter = Arc::new(Rebooter::new(Arc::clone(&self.runner), host));
        let handle = rebooter.schedule(REBOOT_DELAY).at(Stage::SchedulingReboot)?;
        *self.pending_reboot.lock() = Some(handle);
        Ok(())
    }

    /// Report platform attributes selected by `scope`.
    pub fn query(&self, scope: QueryScope) -> (Outcome, Option<QueryResponse>) {
        let _span = info_span!("firmware_query", %scope).entered();

        if let Err(e) = self.host() {
            error!(error = %e, "ERROR: {}", e);
            return (outcome::UNSUPPORTED_OS_FAILURE, None);
        }
        let platform = match self.platform_finder.platform_info() {
            Ok(platform) => platform,
            Err(e) => {
                error!("ERROR: {}", e);
                return (outcome::UNABLE_TO_GET_PLATFORM_INFO_FAILURE, None);
            }
        };

        let response = QueryResponse::new(scope, &platform);
        info!(response = ?response, "Query response");
        (outcome::QUERY_SUCCESS, Some(response))
    }

    /// Wait for a scheduled reboot task, if any, to finish.
    pub async fn wait_for_reboot(&self) {
        let pending = self.pending_reboot.lock().take();
        if let Some(handle) = pending {
            if let Err(e) = handle.await {
                error!(error = %e, "reboot task did not complete");
            }
        }
    }
}

fn required(value: &Option<String>, field: &str) -> Result<String, FirmwareError> {
    value.clone().ok_or_else(|| {
        FirmwareError::InvalidInput(format!("{} is required when AutoFill flag is False", field))
    })
}

fn validate_request(request: &UpdateRequest, os: HostOs) -> Result<ValidatedRequest, FirmwareError> {
    validate_user_string(request.vendor.as_deref(), "BIOS Vendor")?;
    validate_user_string(request.product.as_deref(), "Platform Name")?;
    validate_user_string(request.manufacturer.as_deref(), "Manufacturer")?;
    let guid = validate_guid(request.guid.as_deref())?;
    validate_package_path(&request.package_path, os)?;

    let release_date = match request.release_date.as_deref().filter(|d| !d.is_empty()) {
        Some(date) => validate_release_date(date)?,
        None => Local::now().date_naive().format(DATE_FORMAT).to_string(),
    };

    let capsule = if request.autofill {
        None
    } else {
        Some(PlatformRecord {
            release_date: release_date.clone(),
            vendor: required(&request.vendor, "BIOS Vendor")?,
            product: required(&request.product, "Platform Name")?,
            manufacturer: required(&request.manufacturer, "Manufacturer")?,
            ..PlatformRecord::default()
        })
    };

    Ok(ValidatedRequest {
        package_path: PathBuf::from(&request.package_path),
        release_date,
        guid,
        capsule,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;
    use crate::ports::command::stub::{output, ScriptedRunner};

    const SCHEMA: &str = include_str!("../../resources/firmware_schema.xsd");
    const DB: &str = include_str!("../../resources/firmware_info.db");

    struct FixedPlatform(Option<PlatformRecord>);

    impl PlatformFinder for FixedPlatform {
        fn platform_info(&self) -> Result<PlatformRecord, FirmwareError> {
            self.0
                .clone()
                .ok_or_else(|| FirmwareError::PlatformInfo("no DMI data".to_string()))
        }
    }

    fn kmb_evm() -> PlatformRecord {
        PlatformRecord {
            release_date: "2022-01-01".to_string(),
            vendor: "Intel Corp.".to_string(),
            version: "1.0".to_string(),
            manufacturer: "Intel Corp.".to_string(),
            product: "kmb-evm".to_string(),
        }
    }

    struct Fixture {
        dir: TempDir,
        runner: Arc<ScriptedRunner>,
        updater: FirmwareUpdater,
    }

    impl Fixture {
        fn new(platform: Option<PlatformRecord>, runner: ScriptedRunner) -> Self {
            let dir = TempDir::new().unwrap();
            let paths = PathsSettings {
                firmware_info: dir.path().join("firmware_info.db"),
                firmware_schema: dir.path().join("firmware_schema.xsd"),
            };
            fs::write(&paths.firmware_info, DB).unwrap();
            fs::write(&paths.firmware_schema, SCHEMA).unwrap();
            fs::write(dir.path().join("capsule.bin"), b"capsule").unwrap();

            let runner = Arc::new(runner);
            let updater = FirmwareUpdater::new(
                paths,
                Arc::new(FixedPlatform(platform)),
                runner.clone(),
            )
            .with_host(HostEnvironment::native());
            Self {
                dir,
                runner,
                updater,
            }
        }

        fn package(&self) -> String {
            self.dir.path().join("capsule.bin").to_str().unwrap().to_string()
        }

        fn request(&self, release_date: &str) -> UpdateRequest {
            let platform = kmb_evm();
            UpdateRequest {
                package_path: self.package(),
                release_date: Some(release_date.to_string()),
                vendor: Some(platform.vendor),
                manufacturer: Some(platform.manufacturer),
                product: Some(platform.product),
                ..UpdateRequest::default()
            }
        }
    }

    #[test]
    fn test_stage_outcomes() {
        assert_eq!(Stage::CheckingHost.failure_outcome().status, 501);
        assert_eq!(Stage::ValidatingInput.failure_outcome().status, 400);
        assert_eq!(
            Stage::DetectingPlatform.failure_outcome(),
            outcome::UNABLE_TO_GET_PLATFORM_INFO_FAILURE
        );
        assert_eq!(
            Stage::ResolvingConfig.failure_outcome(),
            outcome::UNABLE_FIND_MATCHING_PLATFORM
        );
        assert_eq!(Stage::CheckingEligibility.failure_outcome().status, 412);
        assert_eq!(Stage::Installing.failure_outcome(), outcome::INSTALL_FAILURE);
        assert_eq!(Stage::SchedulingReboot.failure_outcome(), outcome::REBOOT_FAILURE);
    }

    #[tokio::test]
    async fn test_successful_update_schedules_reboot() {
        let fixture = Fixture::new(Some(kmb_evm()), ScriptedRunner::new());
        let result = fixture.updater.update(fixture.request("2023-05-01")).await;
        assert_eq!(result, outcome::INSTALL_SUCCESS);

        fixture.updater.wait_for_reboot().await;
        let calls = fixture.runner.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], "/usr/sbin/movisoc-fwu --usage");
        assert!(calls[1].starts_with("/usr/sbin/movisoc-fwu -a "));
        assert_eq!(calls[2], "/sbin/reboot -f");
    }

    #[tokio::test]
    async fn test_relative_or_missing_path_is_validation_failure() {
        let fixture = Fixture::new(Some(kmb_evm()), ScriptedRunner::new());

        let relative = UpdateRequest {
            package_path: "capsule.bin".to_string(),
            ..fixture.request("2023-05-01")
        };
        assert_eq!(
            fixture.updater.update(relative).await,
            outcome::INPUT_VALIDATION_FAILURE
        );

        let missing = UpdateRequest {
            package_path: fixture.dir.path().join("nope.bin").to_str().unwrap().to_string(),
            ..fixture.request("2023-05-01")
        };
        assert_eq!(
            fixture.updater.update(missing).await,
            outcome::INPUT_VALIDATION_FAILURE
        );
        assert!(fixture.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_symlinked_package_is_validation_failure() {
        let fixture = Fixture::new(Some(kmb_evm()), ScriptedRunner::new());
        let link = fixture.dir.path().join("link.bin");
        std::os::unix::fs::symlink(Path::new(&fixture.package()), &link).unwrap();

        let request = UpdateRequest {
            package_path: link.to_str().unwrap().to_string(),
            ..fixture.request("2023-05-01")
        };
        assert_eq!(
            fixture.updater.update(request).await,
            outcome::INPUT_VALIDATION_FAILURE
        );
    }

    #[tokio::test]
    async fn test_bad_fields_are_validation_failures() {
        let fixture = Fixture::new(Some(kmb_evm()), ScriptedRunner::new());

        let bad_date = fixture.request("05/01/2023");
        assert_eq!(
            fixture.updater.update(bad_date).await,
            outcome::INPUT_VALIDATION_FAILURE
        );

        let bad_guid = UpdateRequest {
            guid: Some("not-a-guid".to_string()),
            ..fixture.request("2023-05-01")
        };
        assert_eq!(
            fixture.updater.update(bad_guid).await,
            outcome::INPUT_VALIDATION_FAILURE
        );

        let missing_vendor = UpdateRequest {
            vendor: None,
            ..fixture.request("2023-05-01")
        };
        assert_eq!(
            fixture.updater.update(missing_vendor).await,
            outcome::INPUT_VALIDATION_FAILURE
        );
    }

    #[tokio::test]
    async fn test_platform_discovery_failure() {
        let fixture = Fixture::new(None, ScriptedRunner::new());
        assert_eq!(
            fixture.updater.update(fixture.request("2023-05-01")).await,
            outcome::UNABLE_TO_GET_PLATFORM_INFO_FAILURE
        );
    }

    #[tokio::test]
    async fn test_unknown_platform_is_not_found_in_config() {
        let platform = PlatformRecord {
            product: "Mystery Board".to_string(),
            ..kmb_evm()
        };
        let fixture = Fixture::new(Some(platform), ScriptedRunner::new());
        let request = UpdateRequest {
            product: Some("Mystery Board".to_string()),
            ..fixture.request("2023-05-01")
        };
        assert_eq!(
            fixture.updater.update(request).await,
            outcome::UNABLE_FIND_MATCHING_PLATFORM
        );
    }

    #[tokio::test]
    async fn test_broken_config_is_not_found_in_config() {
        let fixture = Fixture::new(Some(kmb_evm()), ScriptedRunner::new());
        fs::remove_file(fixture.dir.path().join("firmware_schema.xsd")).unwrap();
        assert_eq!(
            fixture.updater.update(fixture.request("2023-05-01")).await,
            outcome::UNABLE_FIND_MATCHING_PLATFORM
        );
    }

    #[tokio::test]
    async fn test_identical_capsule_is_rejected() {
        let fixture = Fixture::new(Some(kmb_evm()), ScriptedRunner::new());
        assert_eq!(
            fixture.updater.update(fixture.request("2022-01-01")).await,
            outcome::UPGRADE_CHECK_FAILURE
        );
        assert!(fixture.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_mismatched_vendor_is_rejected() {
        let fixture = Fixture::new(Some(kmb_evm()), ScriptedRunner::new());
        let request = UpdateRequest {
            vendor: Some("Other Vendor".to_string()),
            ..fixture.request("2023-05-01")
        };
        assert_eq!(
            fixture.updater.update(request).await,
            outcome::UPGRADE_CHECK_FAILURE
        );
    }

    #[tokio::test]
    async fn test_tool_failure_is_install_failure() {
        let runner = ScriptedRunner::with_responses([output(0, "", ""), output(5, "", "flash error")]);
        let fixture = Fixture::new(Some(kmb_evm()), runner);
        assert_eq!(
            fixture.updater.update(fixture.request("2023-05-01")).await,
            outcome::INSTALL_FAILURE
        );
        fixture.updater.wait_for_reboot().await;
        assert_eq!(fixture.runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_autofill_uses_platform_identity() {
        let fixture = Fixture::new(Some(kmb_evm()), ScriptedRunner::new());
        let request = UpdateRequest {
            package_path: fixture.package(),
            release_date: Some("2024-02-29".to_string()),
            autofill: true,
            hash_algorithm: Some(HashAlgorithm::Sha512),
            ..UpdateRequest::default()
        };
        assert_eq!(fixture.updater.update(request).await, outcome::INSTALL_SUCCESS);
    }

    #[tokio::test]
    async fn test_autofill_defaults_to_today() {
        let platform = PlatformRecord {
            release_date: "2000-01-01".to_string(),
            ..kmb_evm()
        };
        let fixture = Fixture::new(Some(platform), ScriptedRunner::new());
        let request = UpdateRequest {
            package_path: fixture.package(),
            autofill: true,
            ..UpdateRequest::default()
        };
        assert_eq!(fixture.updater.update(request).await, outcome::INSTALL_SUCCESS);
    }

    #[test]
    fn test_query_scopes() {
        let fixture = Fixture::new(Some(kmb_evm()), ScriptedRunner::new());

        let (result, response) = fixture.updater.query(QueryScope::Hw);
        assert_eq!(result, outcome::QUERY_SUCCESS);
        let response = response.unwrap();
        assert_eq!(response.platform_name.as_deref(), Some("kmb-evm"));
        assert!(response.bios_vendor.is_none());

        let (_, all) = fixture.updater.query(QueryScope::All);
        assert_eq!(all.unwrap().bios_release_date.as_deref(), Some("2022-01-01"));
    }

    #[test]
    fn test_query_without_platform_info() {
        let fixture = Fixture::new(None, ScriptedRunner::new());
        let (result, response) = fixture.updater.query(QueryScope::Fw);
        assert_eq!(result, outcome::UNABLE_TO_GET_PLATFORM_INFO_FAILURE);
        assert!(response.is_none());
    }
}
