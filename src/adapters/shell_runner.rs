//! Runs external programs from a command line without involving a shell.

use std::io::Write;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use tracing::{debug, warn};

use crate::domain::FirmwareError;
use crate::ports::{CommandOutput, CommandRunner};

/// Directories searched, in order, for a bare program name.
pub const BINARY_SEARCH_PATHS: [&str; 4] = ["/bin", "/usr/sbin", "/usr/bin", "/sbin"];

/// Interactive flashing tool that asks for confirmation on stdin.
pub const AFULNX_64: &str = "afulnx_64";

const AFULNX_CONFIRMATION: &[u8] = b"yes\n";

/// [`CommandRunner`] backed by `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SecureCommandRunner;

impl SecureCommandRunner {
    pub fn new() -> Self {
        Self
    }

    /// Split `command_line` with POSIX quoting rules and resolve a bare
    /// program name against [`BINARY_SEARCH_PATHS`].
    ///
    /// An unresolvable program is passed through unchanged; exec reports it.
    pub fn interpret_shell_like_command(command_line: &str) -> Result<Vec<String>, FirmwareError> {
        let mut argv = shlex::split(command_line).ok_or_else(|| {
            FirmwareError::InvalidInput(format!("unbalanced quoting in command: {}", command_line))
        })?;
        let Some(program) = argv.first_mut() else {
            return Err(FirmwareError::InvalidInput("empty command".to_string()));
        };

        if let Some(resolved) = resolve_program(program) {
            *program = resolved.to_string_lossy().into_owned();
        }
        Ok(argv)
    }

    /// Make a string safe to use as a log file name.
    pub fn sanitize_file_name(name: &str) -> String {
        name.replace([' ', '/'], "_")
    }
}

/// Executable for a bare `program` name in [`BINARY_SEARCH_PATHS`]; names
/// containing a `/` are used as given.
fn resolve_program(program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        return None;
    }
    which::which_in(program, Some(BINARY_SEARCH_PATHS.join(":")), "/").ok()
}

fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| -signal))
        .unwrap_or(-1)
}

impl CommandRunner for SecureCommandRunner {
    fn run(&self, command_line: &str, cwd: Option<&Path>) -> Result<CommandOutput, FirmwareError> {
        let argv = Self::interpret_shell_like_command(command_line)?;
        debug!(argv = ?argv, cwd = ?cwd, "spawning process");

        let mut command = Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| FirmwareError::command_failed(command_line, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            if command_line.contains(AFULNX_64) {
                if let Err(e) = stdin.write_all(AFULNX_CONFIRMATION) {
                    // The tool may exit before reading its prompt.
                    warn!(error = %e, "could not send confirmation to {}", AFULNX_64);
                }
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| FirmwareError::command_failed(command_line, e))?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            code: exit_code(output.status),
        };
        debug!(
            code = result.code,
            stdout = %result.stdout.trim_end(),
            stderr = %result.stderr.trim_end(),
            "process finished"
        );
        Ok(result)
    }
}
