use std::path::PathBuf;
use std::future::Future;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

use crate::adapters::TomlSettingsStore;
use crate::app::{FirmwareUpdater, UpdateRequest};
use crate::domain::outcome::{self, Outcome};
use crate::domain::{HashAlgorithm, QueryScope, Settings};
use crate::infrastructure::init_logging;
use crate::ports::SettingsStore;

const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(name = "fwupdate")]
#[command(about = "Guarded platform firmware/BIOS update tool", long_about = None)]
pub struct Cli {
    /// Settings file (default: $FWUPDATE_CONFIG or /etc/fwupdate/fwupdate.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install a firmware package and reboot
    Fw {
        #[arg(long)]
        path: String,
        /// Capsule release date, YYYY-MM-DD
        #[arg(long = "releasedate")]
        release_date: Option<String>,
        #[arg(long)]
        vendor: Option<String>,
        #[arg(long)]
        manufacturer: Option<String>,
        #[arg(long)]
        product: Option<String>,
        #[arg(long)]
        guid: Option<String>,
        /// Take vendor, manufacturer and product from this platform
        #[arg(long)]
        autofill: bool,
        /// 384 or 512
        #[arg(long)]
        hash_algorithm: Option<String>,
    },
    /// Print platform firmware and hardware attributes
    Query {
        #[arg(long, default_value = "all")]
        option: String,
    },
    /// Write a settings file with default values
    InitConfig {
        #[arg(long)]
        force: bool,
    },
}

/// Run a parsed command line to completion.
pub fn execute(cli: Cli) -> Result<ExitCode> {
    let store = TomlSettingsStore::locate(cli.config.as_deref());

    match cli.command {
        Commands::InitConfig { force } => init_config(&store, force),
        Commands::Fw {
            path,
            release_date,
            vendor,
            manufacturer,
            product,
            guid,
            autofill,
            hash_algorithm,
        } => {
            let (_guard, updater) = start(&store, cli.debug)?;
            let hash_algorithm = match hash_algorithm.as_deref().map(str::parse::<HashAlgorithm>) {
                None => None,
                Some(Ok(algorithm)) => Some(algorithm),
                Some(Err(e)) => {
                    error!("ERROR: {}", e);
                    return Ok(finish(outcome::INPUT_VALIDATION_FAILURE));
                }
            };
            let request = UpdateRequest {
                package_path: path,
                release_date,
                vendor,
                manufacturer,
                product,
                guid,
                autofill,
                hash_algorithm,
            };

            let result = block_on_bounded(async {
                let result = updater.update(request).await;
                updater.wait_for_reboot().await;
                result
            })?;
            Ok(finish(result))
        }
        Commands::Query { option } => {
            let (_guard, updater) = start(&store, cli.debug)?;
            let scope = option.parse::<QueryScope>().unwrap_or_default();
            let (result, response) = updater.query(scope);
            if let Some(response) = response {
                println!("{}", serde_json::to_string(&response)?);
            }
            Ok(finish(result))
        }
    }
}

/// Load settings, install logging and build the updater.
fn start(store: &dyn SettingsStore, debug: bool) -> Result<(Option<WorkerGuard>, FirmwareUpdater)> {
    let settings = store
        .load()
        .with_context(|| format!("loading settings from {}", store.config_path().display()))?;
    let level = if debug {
        "debug"
    } else {
        settings.logging.level.as_str()
    };
    let guard = init_logging(&settings.logging.logs_dir, level, settings.logging.file_logging)
        .context("initializing logging")?;
    Ok((guard, FirmwareUpdater::system(settings.paths)))
}

/// Drive `future` on a fresh runtime, then give abandoned blocking work
/// (such as a timed-out config parse) at most [`SHUTDOWN_GRACE`] to finish.
fn block_on_bounded<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    Ok(output)
}

fn finish(result: Outcome) -> ExitCode {
    println!("{}", result);
    if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn init_config(store: &dyn SettingsStore, force: bool) -> Result<ExitCode> {
    let path = store.config_path();
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }
    store.save(&Settings::default())?;
    info!(path = %path.display(), "wrote default settings");
    println!("{}", path.display());
    Ok(ExitCode::SUCCESS)
}
