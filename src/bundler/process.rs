//! External tool invocation.
//!
//! Every packaging tool is reached through [`ProcessRunner`]: hand it a
//! [`CommandSpec`], get back the exit code and captured output. The system
//! runner wraps `tokio::process`; tests substitute a scripted runner that
//! records arguments.

use crate::bundler::error::{Error, Result};
use std::{
    fmt,
    path::{Path, PathBuf},
    process::Stdio,
};

/// Arguments whose following value must not be logged.
const SECRET_FLAGS: &[&str] = &["--password"];

/// A fully constructed invocation of an external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Absolute path of the program.
    pub program: PathBuf,
    /// Arguments in order.
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Creates a command with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends a path argument.
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    /// Short program name for messages.
    pub fn name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    /// Whether the argument list contains `flag`.
    pub fn has_arg(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }

    /// Value following `flag`, if any.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

impl fmt::Display for CommandSpec {
    /// Shell-like rendering with secrets masked.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        let mut mask_next = false;
        for arg in &self.args {
            if mask_next {
                f.write_str(" ********")?;
                mask_next = false;
                continue;
            }
            mask_next = SECRET_FLAGS.contains(&arg.as_str());
            if arg.contains(' ') {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Exit status and captured streams of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub status: Option<i32>,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl ProcessOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// True when the process exited with status 0.
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Best available diagnostic text: stderr, else stdout, else the status.
    pub fn diagnostics(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.status {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs an external command to completion.
#[allow(async_fn_in_trait)]
pub trait ProcessRunner {
    /// Executes `command`, capturing both output streams.
    ///
    /// Only a failure to launch is an `Err`; a non-zero exit is reported
    /// through [`ProcessOutput::status`].
    async fn run(&self, command: &CommandSpec) -> Result<ProcessOutput>;
}

/// Runs commands on the host with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    async fn run(&self, command: &CommandSpec) -> Result<ProcessOutput> {
        log::debug!("Running: {}", command);

        let output = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|error| Error::CommandFailed {
                command: command.name(),
                error,
            })?;

        Ok(ProcessOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner for pipeline tests.

    use super::*;
    use std::cell::RefCell;

    type Handler = Box<dyn FnMut(&CommandSpec) -> ProcessOutput>;

    /// Records every command and answers with a caller-provided closure.
    pub(crate) struct ScriptedRunner {
        calls: RefCell<Vec<CommandSpec>>,
        handler: RefCell<Handler>,
    }

    impl ScriptedRunner {
        pub(crate) fn new(handler: impl FnMut(&CommandSpec) -> ProcessOutput + 'static) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                handler: RefCell::new(Box::new(handler)),
            }
        }

        /// Runner where every command succeeds with empty output.
        pub(crate) fn succeeding() -> Self {
            Self::new(|_| ProcessOutput::ok(""))
        }

        pub(crate) fn calls(&self) -> Vec<CommandSpec> {
            self.calls.borrow().clone()
        }

        /// Commands run through program `name`, or whose first two
        /// arguments (tool and subcommand under `xcrun`) include it.
        pub(crate) fn calls_named(&self, name: &str) -> Vec<CommandSpec> {
            self.calls
                .borrow()
                .iter()
                .filter(|c| c.name() == name || c.args.iter().take(2).any(|a| a == name))
                .cloned()
                .collect()
        }
    }

    impl ProcessRunner for ScriptedRunner {
        async fn run(&self, command: &CommandSpec) -> Result<ProcessOutput> {
            self.calls.borrow_mut().push(command.clone());
            let mut handler = self.handler.borrow_mut();
            Ok((*handler)(command))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_masks_password() {
        let cmd = CommandSpec::new("/usr/bin/xcrun")
            .args(["notarytool", "submit", "--password", "hunter2", "--team-id"])
            .arg("ABCDE12345");
        let rendered = cmd.to_string();
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("--password ********"));
        assert!(rendered.contains("--team-id ABCDE12345"));
    }

    #[test]
    fn value_of_returns_following_argument() {
        let cmd = CommandSpec::new("/usr/bin/pkgbuild").args(["--identifier", "com.example.tool"]);
        assert_eq!(cmd.value_of("--identifier"), Some("com.example.tool"));
        assert_eq!(cmd.value_of("--version"), None);
        assert_eq!(cmd.name(), "pkgbuild");
    }

    #[test]
    fn diagnostics_prefers_stderr() {
        let out = ProcessOutput {
            status: Some(1),
            stdout: "some stdout".into(),
            stderr: "  real problem \n".into(),
        };
        assert_eq!(out.diagnostics(), "real problem");
        assert_eq!(ProcessOutput::failed(3, "").diagnostics(), "exit code 3");
    }

    #[tokio::test]
    async fn system_runner_reports_launch_failure() {
        let cmd = CommandSpec::new("/nonexistent/definitely-not-a-tool");
        let err = SystemRunner.run(&cmd).await.unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }));
    }
}
