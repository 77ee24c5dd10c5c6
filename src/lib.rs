#![forbid(unsafe_code)]

pub mod adapters;
pub mod app;
pub mod commands;
pub mod domain;
pub mod infrastructure;
pub mod ports;

use std::process::ExitCode;

use clap::Parser;

pub use app::{FirmwareUpdater, Stage, UpdateRequest};
pub use domain::{FirmwareError, Outcome};

/// Entry point of the `fwupdate` binary.
pub fn run() -> ExitCode {
    let cli = commands::Cli::parse();
    match commands::execute(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("fwupdate: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
