use crate::RuntimeError;
use std::fmt;
use std::io::{ErrorKind, Write as _};
use std::process::{Child, Command, Stdio};
use tracing::debug;

/// Single-quote a string for POSIX `sh`.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// A fully described external command: program, arguments, environment
/// overrides, and optional bytes fed to its standard input.
///
/// `Display` renders only program and arguments; stdin may carry secrets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<Vec<u8>>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_owned(), value.to_owned()));
        self
    }

    #[must_use]
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd.stdin(if self.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Runs external programs on behalf of the engine.
pub trait CommandExecutor: Send + Sync {
    /// Run to completion with stdout/stderr forwarded to ours. A non-zero
    /// exit is an error.
    fn run(&self, command: &CommandLine) -> Result<(), RuntimeError>;

    /// Run to completion and return captured stdout. Stderr is forwarded.
    fn capture(&self, command: &CommandLine) -> Result<String, RuntimeError>;

    /// Run silently and report whether the command exited successfully.
    /// Only a failure to launch is an error.
    fn probe(&self, command: &CommandLine) -> Result<bool, RuntimeError>;
}

/// `std::process` implementation of [`CommandExecutor`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl SystemExecutor {
    pub fn new() -> Self {
        Self
    }

    fn spawn(
        command: &CommandLine,
        stdout: Stdio,
        stderr: Stdio,
    ) -> Result<Child, RuntimeError> {
        debug!("exec: {command}");
        let mut child = command
            .to_command()
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|source| RuntimeError::Launch {
                program: command.program.clone(),
                source,
            })?;

        if let Some(input) = &command.stdin {
            if let Some(mut pipe) = child.stdin.take() {
                // A child that exits without draining stdin is judged by its
                // exit status, not by the write.
                match pipe.write_all(input) {
                    Err(e) if e.kind() != ErrorKind::BrokenPipe => {
                        drop(pipe);
                        let _ = child.wait();
                        return Err(e.into());
                    }
                    _ => {}
                }
            }
        }
        Ok(child)
    }
}

fn check_status(command: &CommandLine, status: std::process::ExitStatus) -> Result<(), RuntimeError> {
    if status.success() {
        Ok(())
    } else {
        Err(RuntimeError::CommandFailed {
            command: command.to_string(),
            status: status.to_string(),
        })
    }
}

impl CommandExecutor for SystemExecutor {
    fn run(&self, command: &CommandLine) -> Result<(), RuntimeError> {
        let mut child = Self::spawn(command, Stdio::inherit(), Stdio::inherit())?;
        let status = child.wait()?;
        check_status(command, status)
    }

    fn capture(&self, command: &CommandLine) -> Result<String, RuntimeError> {
        let child = Self::spawn(command, Stdio::piped(), Stdio::inherit())?;
        let output = child.wait_with_output()?;
        check_status(command, output.status)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn probe(&self, command: &CommandLine) -> Result<bool, RuntimeError> {
        let mut child = Self::spawn(command, Stdio::null(), Stdio::null())?;
        Ok(child.wait()?.success())
    }
}
