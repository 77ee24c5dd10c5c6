use std::process::ExitCode;

fn main() -> ExitCode {
    fwupdate_lib::run()
}
