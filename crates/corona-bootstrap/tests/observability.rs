//! Observability tests for bootstrap lifecycle tracing.
//!
//! These check that structured events for state transitions, outcomes,
//! remediation stages, subprocesses and faults are emitted without panics
//! under a live subscriber.

use std::path::PathBuf;
use std::sync::Arc;

use corona_bootstrap::obs::{
    emit_fault, emit_outcome, emit_process_exited, emit_process_spawned, emit_remediation_stage,
    emit_state, BootstrapSpan,
};
use corona_bootstrap::platform::OsVersion;
use corona_bootstrap::registry::DEFAULT_BASE_URL;
use corona_bootstrap::testing::{FakePlatform, RecordingInvoker, ScriptedDialogs, ScriptedLoader};
use corona_bootstrap::{
    Architecture, BootstrapOptions, BootstrapState, Bootstrapper, CommandLine, ConsentMode,
    FailureKind, HostingFailure, ProcessExit, RemediationRegistry, RemediationStage,
};
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_emit_state_and_outcome() {
    emit_state(&BootstrapState::Diagnosing(FailureKind::MissingHostAssembly));
    emit_outcome("declined", 1);
}

#[traced_test]
#[test]
fn test_emit_remediation_stage_success_and_failure() {
    emit_remediation_stage(
        &RemediationStage::Download,
        "windowsdesktop-runtime-6.0.5-win-x64-v0.2.exe",
        true,
    );
    // Failures are emitted at warn level.
    emit_remediation_stage(
        &RemediationStage::Install,
        "Windows6.1-KB3063858-x86-v0.2.msu",
        false,
    );
}

#[traced_test]
#[test]
fn test_emit_process_events() {
    let command = CommandLine::new("tools/aria2c.exe")
        .arg(format!("{DEFAULT_BASE_URL}Windows6.1-KB3063858-x64-v0.2.msu"));
    emit_process_spawned(&command);
    emit_process_exited(&command, &ProcessExit::from_code(0));
    emit_process_exited(&command, &ProcessExit::terminated());
}

#[traced_test]
#[test]
fn test_emit_fault_with_and_without_location() {
    emit_fault("index out of range", Some("src/bootstrap.rs:42:9"));
    emit_fault("unknown fault", None);
}

#[traced_test]
#[test]
fn test_bootstrap_span_enter_creates_span() {
    let span = BootstrapSpan::enter("CoronaLauncher.dll");
    drop(span);
}

#[traced_test]
#[test]
fn test_full_run_under_subscriber() {
    let mut loader =
        ScriptedLoader::default().fail_library(HostingFailure::missing_runtime("not found"));
    let platform = FakePlatform::new(Architecture::X86, OsVersion::windows_nt(10, 0, 19045));
    let registry = RemediationRegistry::new(DEFAULT_BASE_URL).unwrap();
    let invoker = RecordingInvoker::default();
    let dialogs = Arc::new(ScriptedDialogs::answering([true, true]));

    let outcome = Bootstrapper::new(
        &mut loader,
        &platform,
        &registry,
        &invoker,
        dialogs,
        BootstrapOptions {
            entry_component: PathBuf::from("CoronaLauncher.dll"),
            consent: ConsentMode::Prompt,
            retry_after_remediation: false,
            downloader: PathBuf::from("tools/aria2c.exe"),
            download_dir: PathBuf::from("redist"),
        },
    )
    .run(&[]);

    assert_eq!(outcome.label(), "installed");
}
