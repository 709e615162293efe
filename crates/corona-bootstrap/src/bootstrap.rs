//! Bootstrap state machine.
//!
//! ```text
//! Start -> LoadingHost -> Running
//!                     \-> Diagnosing(kind) -> AwaitingUserConsent
//!                           -> Downloading -> AwaitingUserConsent
//!                           -> Installing -> Reporting
//! ```
//!
//! Every failure branch ends in a [`BootstrapOutcome`] whose exit code is 1;
//! only `Running` propagates the managed entry's own code. With
//! `retry_after_remediation` a successful install loops back to
//! `LoadingHost` once; a second failure is reported without another
//! remediation round.

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::dialog::{ConsentGate, ConsentMode, Dialogs};
use crate::error::{LauncherError, PlatformError, RemediationError};
use crate::hosting::{FailureKind, HostingFailure, HostingLoader};
use crate::obs::{self, BootstrapSpan};
use crate::platform::Platform;
use crate::process::ProcessInvoker;
use crate::progress::{show_progress, ProgressSession, ProgressSurface, ProgressTemplate};
use crate::registry::{OsRequirement, RemediationArtifact, RemediationRegistry};
use crate::remediation::{RemediationStage, Remediator};
use crate::{messages, EXIT_FAILURE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    Start,
    LoadingHost,
    Running,
    Diagnosing(FailureKind),
    AwaitingUserConsent,
    Downloading,
    Installing,
    Reporting,
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapState::Start => f.write_str("start"),
            BootstrapState::LoadingHost => f.write_str("loading_host"),
            BootstrapState::Running => f.write_str("running"),
            BootstrapState::Diagnosing(kind) => write!(f, "diagnosing({kind})"),
            BootstrapState::AwaitingUserConsent => f.write_str("awaiting_user_consent"),
            BootstrapState::Downloading => f.write_str("downloading"),
            BootstrapState::Installing => f.write_str("installing"),
            BootstrapState::Reporting => f.write_str("reporting"),
        }
    }
}

/// Where a completed remediation left the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationReport {
    Installed {
        artifact: RemediationArtifact,
        restart_required: bool,
    },
    /// Downloaded, but the user chose to install it later.
    Deferred {
        artifact: RemediationArtifact,
        path: PathBuf,
    },
}

/// Terminal value of a launch.
#[derive(Debug)]
pub enum BootstrapOutcome {
    /// The managed entry ran; carries its exit code.
    Success { exit_code: i32 },
    LoadFailure { kind: FailureKind, diagnostic: String },
    UserDeclinedRemediation { kind: FailureKind },
    Remediated(RemediationReport),
    RemediationFailed {
        stage: RemediationStage,
        error: RemediationError,
    },
    /// The platform oracle failed; no remediation can be chosen.
    PlatformFailure {
        kind: FailureKind,
        error: PlatformError,
    },
}

impl BootstrapOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            BootstrapOutcome::Success { exit_code } => *exit_code,
            _ => EXIT_FAILURE,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BootstrapOutcome::Success { .. } => "success",
            BootstrapOutcome::LoadFailure { .. } => "load_failure",
            BootstrapOutcome::UserDeclinedRemediation { .. } => "declined",
            BootstrapOutcome::Remediated(RemediationReport::Installed { .. }) => "installed",
            BootstrapOutcome::Remediated(RemediationReport::Deferred { .. }) => "deferred",
            BootstrapOutcome::RemediationFailed { .. } => "remediation_failed",
            BootstrapOutcome::PlatformFailure { .. } => "platform_failure",
        }
    }

    /// The error taxonomy entry for failed outcomes.
    pub fn into_error(self) -> Option<LauncherError> {
        match self {
            BootstrapOutcome::Success { .. } | BootstrapOutcome::Remediated(_) => None,
            BootstrapOutcome::LoadFailure { kind, diagnostic } => {
                Some(LauncherError::HostingLoad(HostingFailure { kind, diagnostic }))
            }
            BootstrapOutcome::UserDeclinedRemediation { kind } => {
                Some(LauncherError::RemediationDeclined(kind))
            }
            BootstrapOutcome::RemediationFailed { error, .. } => Some(error.into()),
            BootstrapOutcome::PlatformFailure { error, .. } => Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOptions {
    pub entry_component: PathBuf,
    pub consent: ConsentMode,
    pub retry_after_remediation: bool,
    pub downloader: PathBuf,
    pub download_dir: PathBuf,
}

/// Progress display for the download and install steps.
///
/// `runtime` must have worker threads: the steps block the calling thread
/// while the ticker runs.
pub struct ProgressHost {
    pub runtime: Handle,
    pub surface: Arc<dyn ProgressSurface>,
    pub tick: Duration,
}

pub struct Bootstrapper<'a> {
    loader: &'a mut dyn HostingLoader,
    platform: &'a dyn Platform,
    registry: &'a RemediationRegistry,
    invoker: &'a dyn ProcessInvoker,
    dialogs: Arc<dyn Dialogs>,
    options: BootstrapOptions,
    progress: Option<ProgressHost>,
    transitions: Vec<BootstrapState>,
}

impl<'a> Bootstrapper<'a> {
    pub fn new(
        loader: &'a mut dyn HostingLoader,
        platform: &'a dyn Platform,
        registry: &'a RemediationRegistry,
        invoker: &'a dyn ProcessInvoker,
        dialogs: Arc<dyn Dialogs>,
        options: BootstrapOptions,
    ) -> Self {
        Self {
            loader,
            platform,
            registry,
            invoker,
            dialogs,
            options,
            progress: None,
            transitions: Vec::new(),
        }
    }

    pub fn with_progress(mut self, host: ProgressHost) -> Self {
        self.progress = Some(host);
        self
    }

    /// States entered by the last [`run`](Self::run), in order.
    pub fn transitions(&self) -> &[BootstrapState] {
        &self.transitions
    }

    fn enter(&mut self, state: BootstrapState) {
        obs::emit_state(&state);
        self.transitions.push(state);
    }

    /// Drive one launch to its terminal outcome. `args` is forwarded to the
    /// managed entry unchanged.
    pub fn run(&mut self, args: &[OsString]) -> BootstrapOutcome {
        let entry = self.options.entry_component.display().to_string();
        let _span = BootstrapSpan::enter(&entry);

        self.transitions.clear();
        self.enter(BootstrapState::Start);

        let mut retry_available = self.options.retry_after_remediation;
        let mut retrying = false;
        let outcome = loop {
            let failure = match self.load_and_run(args) {
                Ok(exit_code) => break BootstrapOutcome::Success { exit_code },
                Err(failure) => failure,
            };

            if retrying {
                warn!(kind = %failure.kind, "hosting load still failing after remediation");
                self.enter(BootstrapState::Reporting);
                self.dialogs.error(&messages::load_failure(
                    failure.kind,
                    &self.options.entry_component,
                    &failure.diagnostic,
                ));
                break BootstrapOutcome::LoadFailure {
                    kind: failure.kind,
                    diagnostic: failure.diagnostic,
                };
            }

            match self.diagnose(failure, retry_available) {
                BootstrapOutcome::Remediated(RemediationReport::Installed { .. })
                    if retry_available =>
                {
                    info!("remediation installed, retrying hosting load");
                    retry_available = false;
                    retrying = true;
                }
                outcome => break outcome,
            }
        };

        obs::emit_outcome(outcome.label(), outcome.exit_code());
        outcome
    }

    fn load_and_run(&mut self, args: &[OsString]) -> Result<i32, HostingFailure> {
        self.enter(BootstrapState::LoadingHost);
        self.loader.load_hosting_library()?;
        let exit_code = self
            .loader
            .load_and_run_entry(args, &self.options.entry_component)?;
        self.enter(BootstrapState::Running);
        Ok(exit_code)
    }

    /// `retry_follows`: a successful install loops back to the hosting load.
    fn diagnose(&mut self, failure: HostingFailure, retry_follows: bool) -> BootstrapOutcome {
        let HostingFailure { kind, diagnostic } = failure;
        self.enter(BootstrapState::Diagnosing(kind));
        warn!(kind = %kind, diagnostic = %diagnostic, "hosting load failed");

        let dialogs = Arc::clone(&self.dialogs);
        dialogs.error(&messages::load_failure(
            kind,
            &self.options.entry_component,
            &diagnostic,
        ));

        let artifact = match self.choose_artifact(kind) {
            Ok(Some(artifact)) => artifact,
            Ok(None) => {
                self.enter(BootstrapState::Reporting);
                return BootstrapOutcome::LoadFailure { kind, diagnostic };
            }
            Err(error) => {
                dialogs.error(&messages::platform_fatal(&error));
                return BootstrapOutcome::PlatformFailure { kind, error };
            }
        };

        let gate = ConsentGate::new(dialogs.as_ref(), self.options.consent);

        self.enter(BootstrapState::AwaitingUserConsent);
        if !gate.ask(&messages::offer_download(&artifact)) {
            dialogs.inform(&messages::manual_instructions(&artifact));
            return BootstrapOutcome::UserDeclinedRemediation { kind };
        }

        let remediator = Remediator::new(
            self.invoker,
            &self.options.downloader,
            &self.options.download_dir,
        );

        self.enter(BootstrapState::Downloading);
        let progress = self.start_progress("Downloading", &artifact.file_name);
        let downloaded = remediator.download(&artifact);
        finish_progress(progress);
        let path = match downloaded {
            Ok(path) => path,
            Err(error) => return self.remediation_failed(&artifact, None, error),
        };

        self.enter(BootstrapState::AwaitingUserConsent);
        if !gate.ask(&messages::offer_install(&artifact)) {
            self.enter(BootstrapState::Reporting);
            dialogs.inform(&messages::saved_locally(&artifact, &path));
            return BootstrapOutcome::Remediated(RemediationReport::Deferred { artifact, path });
        }

        self.enter(BootstrapState::Installing);
        let progress = self.start_progress("Installing", &artifact.file_name);
        let installed = remediator.install(&artifact);
        finish_progress(progress);
        match installed {
            Ok(receipt) => {
                self.enter(BootstrapState::Reporting);
                let text = if retry_follows {
                    messages::installed_retrying(&artifact, receipt.restart_required)
                } else {
                    messages::installed(&artifact, receipt.restart_required)
                };
                dialogs.inform(&text);
                BootstrapOutcome::Remediated(RemediationReport::Installed {
                    artifact,
                    restart_required: receipt.restart_required,
                })
            }
            Err(error) => self.remediation_failed(&artifact, Some(&path), error),
        }
    }

    /// `Ok(None)` when the failure has no applicable remediation on this OS.
    fn choose_artifact(
        &self,
        kind: FailureKind,
    ) -> Result<Option<RemediationArtifact>, PlatformError> {
        let architecture = self.platform.current_architecture()?;
        let artifact = self.registry.lookup(kind, architecture);

        if artifact.os_requirement == OsRequirement::LegacyOnly && !self.platform.is_legacy_os()? {
            let os = self.platform.os_version()?;
            info!(artifact = %artifact.file_name, os = %os, "remediation not applicable");
            self.dialogs.inform(&messages::patch_not_applicable(&os));
            return Ok(None);
        }
        Ok(Some(artifact))
    }

    fn remediation_failed(
        &mut self,
        artifact: &RemediationArtifact,
        path: Option<&std::path::Path>,
        error: RemediationError,
    ) -> BootstrapOutcome {
        self.enter(BootstrapState::Reporting);
        let stage = error.stage();
        let text = match (stage, path) {
            (RemediationStage::Install, Some(path)) => messages::install_failed(artifact, path, &error),
            _ => messages::transfer_failed(artifact, &error),
        };
        self.dialogs.error(&text);
        BootstrapOutcome::RemediationFailed { stage, error }
    }

    fn start_progress(&self, title: &str, file_name: &str) -> Option<ProgressSession> {
        let host = self.progress.as_ref()?;
        let template =
            ProgressTemplate::new(title, host.tick).with_status(format!("{title} {file_name}"));
        let dialogs = Arc::clone(&self.dialogs);
        Some(show_progress(
            &host.runtime,
            Arc::clone(&host.surface),
            &template,
            move |control| {
                control.set_close_window_handler(move || {
                    dialogs.confirm(&messages::confirm_close_progress())
                });
            },
        ))
    }
}

fn finish_progress(session: Option<ProgressSession>) {
    if let Some(session) = session {
        session.finish();
    }
}
