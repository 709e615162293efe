//! Scripted fakes for the bootstrap's collaborators (testing only)
//!
//! Provides `ScriptedLoader`, `FakePlatform`, `RecordingInvoker`,
//! `ScriptedDialogs` and `RecordingSurface` so the state machine runs
//! without a hosting library, subprocesses or a desktop.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::dialog::Dialogs;
use crate::error::{InvokeError, PlatformError};
use crate::hosting::{HostingFailure, HostingLoader};
use crate::platform::{Architecture, OsVersion, Platform};
use crate::process::{CommandLine, ProcessExit, ProcessInvoker};
use crate::progress::ProgressSurface;

// ---------------------------------------------------------------------------
// ScriptedLoader
// ---------------------------------------------------------------------------

/// Hosting loader whose stage results are queued up front. Once a queue is
/// empty the stage succeeds; the entry then returns `exit_code`.
#[derive(Debug, Default)]
pub struct ScriptedLoader {
    library_failures: VecDeque<HostingFailure>,
    entry_failures: VecDeque<HostingFailure>,
    exit_code: i32,
    library_calls: usize,
    received_args: Vec<Vec<OsString>>,
    received_entries: Vec<PathBuf>,
}

impl ScriptedLoader {
    pub fn fail_library(mut self, failure: HostingFailure) -> Self {
        self.library_failures.push_back(failure);
        self
    }

    pub fn fail_entry(mut self, failure: HostingFailure) -> Self {
        self.entry_failures.push_back(failure);
        self
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn library_calls(&self) -> usize {
        self.library_calls
    }

    /// Argument vectors handed to the entry stage, one per call.
    pub fn received_args(&self) -> &[Vec<OsString>] {
        &self.received_args
    }

    pub fn received_entries(&self) -> &[PathBuf] {
        &self.received_entries
    }
}

impl HostingLoader for ScriptedLoader {
    fn load_hosting_library(&mut self) -> Result<(), HostingFailure> {
        self.library_calls += 1;
        match self.library_failures.pop_front() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    fn load_and_run_entry(
        &mut self,
        args: &[OsString],
        entry_component: &Path,
    ) -> Result<i32, HostingFailure> {
        self.received_args.push(args.to_vec());
        self.received_entries.push(entry_component.to_path_buf());
        match self.entry_failures.pop_front() {
            Some(failure) => Err(failure),
            None => Ok(self.exit_code),
        }
    }
}

// ---------------------------------------------------------------------------
// FakePlatform
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FakePlatform {
    result: Result<(Architecture, OsVersion), PlatformError>,
}

impl FakePlatform {
    pub fn new(architecture: Architecture, os: OsVersion) -> Self {
        Self {
            result: Ok((architecture, os)),
        }
    }

    /// An x64 machine on the legacy OS class.
    pub fn legacy_x64() -> Self {
        Self::new(Architecture::X64, OsVersion::windows_nt(6, 1, 7601))
    }

    /// Every query fails with `error`.
    pub fn failing(error: PlatformError) -> Self {
        Self { result: Err(error) }
    }
}

impl Platform for FakePlatform {
    fn current_architecture(&self) -> Result<Architecture, PlatformError> {
        self.result.clone().map(|(arch, _)| arch)
    }

    fn os_version(&self) -> Result<OsVersion, PlatformError> {
        self.result.clone().map(|(_, os)| os)
    }
}

// ---------------------------------------------------------------------------
// RecordingInvoker
// ---------------------------------------------------------------------------

/// Records every command. Exits are taken from a queue, then default to 0.
#[derive(Debug, Default)]
pub struct RecordingInvoker {
    exits: Mutex<VecDeque<ProcessExit>>,
    spawn_fails: bool,
    commands: Mutex<Vec<CommandLine>>,
}

impl RecordingInvoker {
    pub fn with_exits(self, exits: impl IntoIterator<Item = ProcessExit>) -> Self {
        self.exits.lock().unwrap().extend(exits);
        self
    }

    /// Every spawn fails as if the program did not exist.
    pub fn failing_spawn(mut self) -> Self {
        self.spawn_fails = true;
        self
    }

    pub fn commands(&self) -> Vec<CommandLine> {
        self.commands.lock().unwrap().clone()
    }
}

impl ProcessInvoker for RecordingInvoker {
    fn run_blocking(&self, command: &CommandLine) -> Result<ProcessExit, InvokeError> {
        self.commands.lock().unwrap().push(command.clone());
        if self.spawn_fails {
            return Err(InvokeError::Spawn {
                program: command.program.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "program not found"),
            });
        }
        Ok(self
            .exits
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ProcessExit::from_code(0)))
    }
}

// ---------------------------------------------------------------------------
// ScriptedDialogs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    Info,
    Error,
    Confirm,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShownDialog {
    pub kind: DialogKind,
    pub message: String,
}

/// Dialogs answered from a queue; unanswered confirmations get
/// `default_answer` (no, unless changed).
#[derive(Debug, Default)]
pub struct ScriptedDialogs {
    answers: Mutex<VecDeque<bool>>,
    default_answer: bool,
    shown: Mutex<Vec<ShownDialog>>,
}

impl ScriptedDialogs {
    pub fn answering(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn with_default_answer(mut self, answer: bool) -> Self {
        self.default_answer = answer;
        self
    }

    pub fn shown(&self) -> Vec<ShownDialog> {
        self.shown.lock().unwrap().clone()
    }

    fn messages(&self, kind: DialogKind) -> Vec<String> {
        self.shown
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.kind == kind)
            .map(|d| d.message.clone())
            .collect()
    }

    pub fn infos(&self) -> Vec<String> {
        self.messages(DialogKind::Info)
    }

    pub fn errors(&self) -> Vec<String> {
        self.messages(DialogKind::Error)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.messages(DialogKind::Confirm)
    }

    pub fn confirmations(&self) -> usize {
        self.prompts().len()
    }

    fn push(&self, kind: DialogKind, message: &str) {
        self.shown.lock().unwrap().push(ShownDialog {
            kind,
            message: message.to_string(),
        });
    }
}

impl Dialogs for ScriptedDialogs {
    fn inform(&self, message: &str) {
        self.push(DialogKind::Info, message);
    }

    fn error(&self, message: &str) {
        self.push(DialogKind::Error, message);
    }

    fn confirm(&self, message: &str) -> bool {
        self.push(DialogKind::Confirm, message);
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default_answer)
    }
}

// ---------------------------------------------------------------------------
// RecordingSurface
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    Progress(u8),
    Status(String),
    Closed,
}

/// Progress surface that records every call in order.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    events: Mutex<Vec<SurfaceEvent>>,
}

impl RecordingSurface {
    pub fn events(&self) -> Vec<SurfaceEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn progress_updates(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SurfaceEvent::Progress(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn status_texts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SurfaceEvent::Status(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.events().contains(&SurfaceEvent::Closed)
    }

    /// Whether the close notification was the final call.
    pub fn closed_last(&self) -> bool {
        self.events().last() == Some(&SurfaceEvent::Closed)
    }
}

impl ProgressSurface for RecordingSurface {
    fn set_progress(&self, percent: u8) {
        self.events.lock().unwrap().push(SurfaceEvent::Progress(percent));
    }

    fn set_status_text(&self, text: &str) {
        self.events
            .lock()
            .unwrap()
            .push(SurfaceEvent::Status(text.to_string()));
    }

    fn close(&self) {
        self.events.lock().unwrap().push(SurfaceEvent::Closed);
    }
}
