//! Blocking subprocess invocation for the downloader and installers.
//!
//! The invoker launches a process, waits for it, and reports the exit status
//! and nothing else: output is not captured and there is no timeout, so a
//! hung installer blocks the launcher until it returns.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use crate::error::InvokeError;
use crate::obs;

/// A program plus arguments, executed without a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
}

impl CommandLine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_quoted(f, self.program.as_os_str())?;
        for arg in &self.args {
            f.write_str(" ")?;
            write_quoted(f, arg)?;
        }
        Ok(())
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, part: &OsStr) -> fmt::Result {
    let text = part.to_string_lossy();
    if text.is_empty() || text.contains(char::is_whitespace) {
        write!(f, "\"{text}\"")
    } else {
        f.write_str(&text)
    }
}

/// How a process that did start came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    code: Option<i32>,
}

impl ProcessExit {
    pub fn from_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    /// Terminated without an exit code (e.g. killed by a signal).
    pub fn terminated() -> Self {
        Self { code: None }
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exited with code {code}"),
            None => f.write_str("was terminated without an exit code"),
        }
    }
}

/// Runs a command to completion.
pub trait ProcessInvoker {
    /// Spawn `command` and block until it exits.
    ///
    /// `Err` means the process never started; a started process that fails
    /// is `Ok` with a non-success [`ProcessExit`].
    fn run_blocking(&self, command: &CommandLine) -> Result<ProcessExit, InvokeError>;
}

/// Invoker backed by `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInvoker;

impl ProcessInvoker for SystemInvoker {
    fn run_blocking(&self, command: &CommandLine) -> Result<ProcessExit, InvokeError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args).stdin(Stdio::null());
        if let Some(dir) = &command.current_dir {
            cmd.current_dir(dir);
        }

        obs::emit_process_spawned(command);
        let status = cmd.status().map_err(|source| InvokeError::Spawn {
            program: command.program.display().to_string(),
            source,
        })?;

        let exit = ProcessExit::from(status);
        obs::emit_process_exited(command, &exit);
        Ok(exit)
    }
}
