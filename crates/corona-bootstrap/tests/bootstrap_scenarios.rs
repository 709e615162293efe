//! End-to-end scenarios for the bootstrap state machine, driven through the
//! scripted collaborators in `corona_bootstrap::testing`.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use corona_bootstrap::platform::OsVersion;
use corona_bootstrap::registry::DEFAULT_BASE_URL;
use corona_bootstrap::testing::{FakePlatform, RecordingInvoker, ScriptedDialogs, ScriptedLoader};
use corona_bootstrap::{
    Architecture, BootstrapOptions, BootstrapOutcome, BootstrapState, Bootstrapper, ConsentMode,
    FailureKind, HostingFailure, LauncherError, ProcessExit, RemediationRegistry,
    RemediationReport, RemediationStage,
};

fn options() -> BootstrapOptions {
    BootstrapOptions {
        entry_component: PathBuf::from("CoronaLauncher.dll"),
        consent: ConsentMode::Prompt,
        retry_after_remediation: false,
        downloader: PathBuf::from("tools/aria2c.exe"),
        download_dir: PathBuf::from("redist"),
    }
}

fn registry() -> RemediationRegistry {
    RemediationRegistry::new(DEFAULT_BASE_URL).expect("default registry")
}

fn modern_x64() -> FakePlatform {
    FakePlatform::new(Architecture::X64, OsVersion::windows_nt(10, 0, 22631))
}

#[test]
fn test_missing_library_declined_exits_one_without_subprocess() {
    let mut loader = ScriptedLoader::default().fail_library(HostingFailure::missing_runtime(
        "libhostfxr.so was not found. Searched:\n  /opt/corona/libhostfxr.so",
    ));
    let platform = modern_x64();
    let registry = registry();
    let invoker = RecordingInvoker::default();
    let dialogs = Arc::new(ScriptedDialogs::answering([false]));

    let mut machine = Bootstrapper::new(
        &mut loader,
        &platform,
        &registry,
        &invoker,
        dialogs.clone(),
        options(),
    );
    let outcome = machine.run(&[]);

    assert!(machine
        .transitions()
        .contains(&BootstrapState::Diagnosing(FailureKind::MissingManagedRuntime)));
    assert_eq!(outcome.exit_code(), 1);
    assert!(matches!(
        outcome,
        BootstrapOutcome::UserDeclinedRemediation {
            kind: FailureKind::MissingManagedRuntime
        }
    ));
    assert!(invoker.commands().is_empty());

    // The low-level reason reaches the user, then the manual instructions.
    let errors = dialogs.errors();
    assert!(errors[0].contains("was not found"));
    let infos = dialogs.infos();
    assert!(infos.last().unwrap().contains(DEFAULT_BASE_URL));

    assert!(matches!(
        outcome.into_error(),
        Some(LauncherError::RemediationDeclined(FailureKind::MissingManagedRuntime))
    ));
}

#[test]
fn test_missing_entry_on_legacy_os_downloads_then_installs_patch() {
    let mut loader = ScriptedLoader::default().fail_entry(HostingFailure::missing_host_assembly(
        "failed to initialise CoronaLauncher.dll (hostfxr status 0x80008096, FrameworkMissingFailure)",
    ));
    let platform = FakePlatform::legacy_x64();
    let registry = registry();
    let invoker = RecordingInvoker::default();
    let dialogs = Arc::new(ScriptedDialogs::answering([true, true]));

    let mut machine = Bootstrapper::new(
        &mut loader,
        &platform,
        &registry,
        &invoker,
        dialogs.clone(),
        options(),
    );
    let outcome = machine.run(&[]);

    assert_eq!(
        machine.transitions(),
        [
            BootstrapState::Start,
            BootstrapState::LoadingHost,
            BootstrapState::Diagnosing(FailureKind::MissingHostAssembly),
            BootstrapState::AwaitingUserConsent,
            BootstrapState::Downloading,
            BootstrapState::AwaitingUserConsent,
            BootstrapState::Installing,
            BootstrapState::Reporting,
        ]
    );

    let commands = invoker.commands();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0].program, PathBuf::from("tools/aria2c.exe"));
    assert_eq!(
        commands[0].args,
        [OsString::from(format!(
            "{DEFAULT_BASE_URL}Windows6.1-KB3063858-x64-v0.2.msu"
        ))]
    );
    assert_eq!(commands[1].program, PathBuf::from("wusa.exe"));
    assert_eq!(
        commands[1].args[0],
        PathBuf::from("redist")
            .join("Windows6.1-KB3063858-x64-v0.2.msu")
            .into_os_string()
    );

    let BootstrapOutcome::Remediated(RemediationReport::Installed { artifact, .. }) = &outcome
    else {
        panic!("expected installed report, got {outcome:?}");
    };
    assert_eq!(artifact.architecture, Architecture::X64);
    assert!(dialogs.infos().last().unwrap().contains("installed"));
    assert_eq!(outcome.exit_code(), 1);
}

#[test]
fn test_download_failure_skips_install() {
    let mut loader =
        ScriptedLoader::default().fail_library(HostingFailure::missing_runtime("not found"));
    let platform = FakePlatform::new(Architecture::X86, OsVersion::windows_nt(10, 0, 19045));
    let registry = registry();
    let invoker = RecordingInvoker::default().with_exits([ProcessExit::from_code(7)]);
    let dialogs = Arc::new(ScriptedDialogs::answering([true]));

    let outcome = Bootstrapper::new(
        &mut loader,
        &platform,
        &registry,
        &invoker,
        dialogs.clone(),
        options(),
    )
    .run(&[]);

    assert!(matches!(
        outcome,
        BootstrapOutcome::RemediationFailed {
            stage: RemediationStage::Download,
            ..
        }
    ));
    assert_eq!(invoker.commands().len(), 1);
    assert_eq!(dialogs.confirmations(), 1);

    let last_error = dialogs.errors().pop().unwrap();
    assert!(last_error.contains("Downloading"));
    assert!(last_error.contains("code 7"));

    assert!(matches!(
        outcome.into_error(),
        Some(LauncherError::RemediationTransfer { .. })
    ));
}

#[test]
fn test_managed_exit_code_is_propagated_without_dialogs() {
    let mut loader = ScriptedLoader::default().with_exit_code(42);
    let platform = modern_x64();
    let registry = registry();
    let invoker = RecordingInvoker::default();
    let dialogs = Arc::new(ScriptedDialogs::default());
    let args = vec![OsString::from("--server"), OsString::from("cn-east 2")];

    let outcome = Bootstrapper::new(
        &mut loader,
        &platform,
        &registry,
        &invoker,
        dialogs.clone(),
        options(),
    )
    .run(&args);

    assert_eq!(outcome.exit_code(), 42);
    assert!(dialogs.shown().is_empty());
    assert!(invoker.commands().is_empty());
    assert_eq!(loader.received_args(), [args]);
    assert_eq!(loader.received_entries(), [PathBuf::from("CoronaLauncher.dll")]);
}

#[test]
fn test_spawn_failure_is_reported_as_download_stage() {
    let mut loader =
        ScriptedLoader::default().fail_library(HostingFailure::missing_runtime("not found"));
    let platform = modern_x64();
    let registry = registry();
    let invoker = RecordingInvoker::default().failing_spawn();
    let dialogs = Arc::new(ScriptedDialogs::answering([true]));

    let outcome = Bootstrapper::new(
        &mut loader,
        &platform,
        &registry,
        &invoker,
        dialogs.clone(),
        options(),
    )
    .run(&[]);

    assert!(matches!(
        outcome,
        BootstrapOutcome::RemediationFailed {
            stage: RemediationStage::Download,
            ..
        }
    ));
    assert!(matches!(outcome.into_error(), Some(LauncherError::Spawn(_))));
    assert!(dialogs.errors().last().unwrap().contains("tools/aria2c.exe"));
}

#[test]
fn test_assume_no_never_prompts_or_spawns() {
    let mut loader =
        ScriptedLoader::default().fail_library(HostingFailure::missing_runtime("not found"));
    let platform = modern_x64();
    let registry = registry();
    let invoker = RecordingInvoker::default();
    let dialogs = Arc::new(ScriptedDialogs::default().with_default_answer(true));
    let mut opts = options();
    opts.consent = ConsentMode::AssumeNo;

    let outcome =
        Bootstrapper::new(&mut loader, &platform, &registry, &invoker, dialogs.clone(), opts)
            .run(&[]);

    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(dialogs.confirmations(), 0);
    assert!(invoker.commands().is_empty());
}
