use std::path::Path;

use crate::domain::FirmwareError;

/// Captured result of one subprocess run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; a signal-terminated process reports the negated signal.
    pub code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Port for running external programs.
///
/// Implementations must never hand `command_line` to a shell.
pub trait CommandRunner: Send + Sync {
    /// Tokenize `command_line`, resolve the program and run it to completion.
    ///
    /// Returns an error only when the process could not be started; a
    /// non-zero exit is reported through [`CommandOutput::code`].
    fn run(&self, command_line: &str, cwd: Option<&Path>) -> Result<CommandOutput, FirmwareError>;

    /// Whether a tool exists at exactly this path.
    fn tool_exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

#[cfg(test)]
pub(crate) mod stub {
    use std::collections::VecDeque;

    use parking_lot::Mutex;

    use super::*;

    /// Records every command line and answers from a script; an exhausted
    /// script answers with exit code 0.
    #[derive(Default)]
    pub(crate) struct ScriptedRunner {
        pub(crate) calls: Mutex<Vec<String>>,
        pub(crate) responses: Mutex<VecDeque<CommandOutput>>,
        pub(crate) tools_missing: bool,
    }

    impl ScriptedRunner {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn with_responses(responses: impl IntoIterator<Item = CommandOutput>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                ..Self::default()
            }
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    pub(crate) fn output(code: i32, stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            code,
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, command_line: &str, _cwd: Option<&Path>) -> Result<CommandOutput, FirmwareError> {
            self.calls.lock().push(command_line.to_string());
            Ok(self.responses.lock().pop_front().unwrap_or_default())
        }

        fn tool_exists(&self, _path: &Path) -> bool {
            !self.tools_missing
        }
    }
}
