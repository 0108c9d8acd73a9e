//! External networking commands.
//!
//! Interface, address and route mutation is delegated to `ip(8)`. A command
//! aimed at another namespace is wrapped in `nsenter --net=<path>` so the
//! calling thread never leaves its own namespace for it.

use std::fmt;

use thiserror::Error;
use vifbind_common::error::BindingError;

use crate::namespace::NetnsHandle;

/// A command line to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name, resolved through `PATH`.
    pub program: String,
    /// Arguments in order.
    pub args: Vec<String>,
}

impl Invocation {
    /// Creates an invocation of `program` with `args`.
    pub fn new<I, A>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates an `ip(8)` invocation.
    pub fn ip<I, A>(args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self::new("ip", args)
    }

    /// Wraps the invocation so it executes inside `netns`.
    ///
    /// The current-namespace handle leaves the invocation unchanged.
    #[must_use]
    pub fn in_netns(self, netns: &NetnsHandle) -> Self {
        let Some(path) = netns.path() else {
            return self;
        };
        let mut args = vec![format!("--net={}", path.display()), "--".to_string(), self.program];
        args.extend(self.args);
        Self {
            program: "nsenter".into(),
            args,
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Classification of a failed command, derived from its error output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The object being created already exists (`EEXIST`).
    Exists,
    /// The named device does not exist.
    NoDevice,
    /// The kernel refused the operation (`EPERM`).
    NotPermitted,
    /// The target namespace could not be entered.
    NoNamespace,
    /// The program is not installed.
    NotInstalled,
    /// Any other failure.
    Other,
}

impl FailureKind {
    /// Classifies the standard error of a failed `ip`/`nsenter` run.
    #[must_use]
    pub fn classify(stderr: &str) -> Self {
        if stderr.contains("File exists") {
            Self::Exists
        } else if stderr.contains("Cannot find device") || stderr.contains("does not exist") {
            Self::NoDevice
        } else if stderr.contains("Operation not permitted") {
            Self::NotPermitted
        } else if stderr.contains("nsenter") && stderr.contains("No such file") {
            Self::NoNamespace
        } else {
            Self::Other
        }
    }
}

/// A command that could not be run or exited unsuccessfully.
#[derive(Debug, Clone, Error)]
#[error("`{command}` failed: {stderr}")]
pub struct CommandFailure {
    /// Rendered command line.
    pub command: String,
    /// Trimmed standard error.
    pub stderr: String,
    /// Failure classification.
    pub kind: FailureKind,
}

impl CommandFailure {
    /// Builds a failure for `invocation`, classifying `stderr`.
    #[must_use]
    pub fn new(invocation: &Invocation, stderr: &str) -> Self {
        let stderr = stderr.trim().to_string();
        Self {
            command: invocation.to_string(),
            kind: FailureKind::classify(&stderr),
            stderr,
        }
    }
}

impl From<CommandFailure> for BindingError {
    fn from(failure: CommandFailure) -> Self {
        match failure.kind {
            FailureKind::NotPermitted => Self::PrivilegeDenied {
                message: format!("`{}`: {}", failure.command, failure.stderr),
            },
            _ => Self::Command {
                command: failure.command,
                stderr: failure.stderr,
            },
        }
    }
}

/// Executes invocations.
pub trait CommandRunner: Send + Sync {
    /// Runs `invocation` to completion and returns its standard output.
    ///
    /// # Errors
    ///
    /// Returns a classified failure if the program is missing or exits
    /// with a non-zero status.
    fn run(&self, invocation: &Invocation) -> Result<String, CommandFailure>;
}

/// Runs invocations as child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<String, CommandFailure> {
        let program = which::which(&invocation.program).map_err(|e| CommandFailure {
            command: invocation.to_string(),
            stderr: format!("{} not found: {e}", invocation.program),
            kind: FailureKind::NotInstalled,
        })?;
        tracing::debug!(command = %invocation, "running command");
        let output = std::process::Command::new(program)
            .args(&invocation.args)
            .output()
            .map_err(|e| CommandFailure {
                command: invocation.to_string(),
                stderr: e.to_string(),
                kind: FailureKind::Other,
            })?;
        if !output.status.success() {
            return Err(CommandFailure::new(
                invocation,
                &String::from_utf8_lossy(&output.stderr),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Records invocations and answers with scripted results.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedRunner {
        pub calls: Mutex<Vec<Invocation>>,
        pub responses: Mutex<VecDeque<Result<String, &'static str>>>,
    }

    impl ScriptedRunner {
        pub(crate) fn respond(self, response: Result<&str, &'static str>) -> Self {
            self.responses
                .lock()
                .unwrap()
                .push_back(response.map(str::to_string));
            self
        }

        pub(crate) fn rendered(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(ToString::to_string).collect()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, invocation: &Invocation) -> Result<String, CommandFailure> {
            self.calls.lock().unwrap().push(invocation.clone());
            match self.responses.lock().unwrap().pop_front() {
                Some(Err(stderr)) => Err(CommandFailure::new(invocation, stderr)),
                Some(Ok(stdout)) => Ok(stdout),
                None => Ok(String::new()),
            }
        }
    }

    #[test]
    fn in_netns_wraps_with_nsenter() {
        let file = tempfile::NamedTempFile::new().expect("failed to create tempfile");
        let handle = NetnsHandle::open(Some(file.path())).unwrap();
        let inv = Invocation::ip(["link", "show", "dev", "eth0"]).in_netns(&handle);
        assert_eq!(inv.program, "nsenter");
        assert_eq!(inv.args[0], format!("--net={}", file.path().display()));
        assert_eq!(&inv.args[1..3], ["--", "ip"]);
        assert_eq!(inv.args.last().map(String::as_str), Some("eth0"));
    }

    #[test]
    fn in_current_namespace_is_unchanged() {
        let inv = Invocation::ip(["link", "show"]);
        assert_eq!(inv.clone().in_netns(&NetnsHandle::current()), inv);
        assert_eq!(inv.to_string(), "ip link show");
    }

    #[test]
    fn classifies_iproute_errors() {
        assert_eq!(FailureKind::classify("RTNETLINK answers: File exists"), FailureKind::Exists);
        assert_eq!(
            FailureKind::classify("Cannot find device \"eth9\""),
            FailureKind::NoDevice
        );
        assert_eq!(
            FailureKind::classify("RTNETLINK answers: Operation not permitted"),
            FailureKind::NotPermitted
        );
        assert_eq!(
            FailureKind::classify("nsenter: cannot open /proc/1/ns/net: No such file or directory"),
            FailureKind::NoNamespace
        );
        assert_eq!(FailureKind::classify("Error: inet prefix is expected"), FailureKind::Other);
    }

    #[test]
    fn not_permitted_maps_to_privilege_denied() {
        let inv = Invocation::ip(["addr", "add", "10.0.0.5/24", "dev", "eth0"]);
        let err: BindingError =
            CommandFailure::new(&inv, "RTNETLINK answers: Operation not permitted\n").into();
        assert!(matches!(err, BindingError::PrivilegeDenied { .. }));
    }

    #[test]
    fn other_failures_keep_command_line() {
        let inv = Invocation::ip(["route", "add", "bogus"]);
        let err: BindingError = CommandFailure::new(&inv, "Error: any valid prefix is expected").into();
        match err {
            BindingError::Command { command, stderr } => {
                assert_eq!(command, "ip route add bogus");
                assert!(stderr.starts_with("Error"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
