//! User-facing dialog texts.

use std::path::Path;

use crate::crash::Fault;
use crate::error::{ConfigError, PlatformError, RemediationError};
use crate::hosting::FailureKind;
use crate::platform::OsVersion;
use crate::registry::{ArtifactKind, RemediationArtifact};

fn artifact_noun(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Runtime => ".NET desktop runtime",
        ArtifactKind::Patch => "compatibility patch",
    }
}

/// Error dialog shown when a hosting stage fails. Always embeds `diagnostic`.
pub fn load_failure(kind: FailureKind, entry_component: &Path, diagnostic: &str) -> String {
    match kind {
        FailureKind::MissingManagedRuntime => format!(
            "The .NET hosting library could not be loaded. The .NET desktop runtime \
             may be missing.\n\n{diagnostic}"
        ),
        FailureKind::MissingHostAssembly => format!(
            "{} could not be loaded. The installation may be damaged, or your \
             operating system may need a compatibility patch.\n\n{diagnostic}",
            entry_component.display()
        ),
    }
}

pub fn offer_download(artifact: &RemediationArtifact) -> String {
    format!(
        "Download the {} ({}) now?",
        artifact_noun(artifact.kind),
        artifact.architecture
    )
}

pub fn offer_install(artifact: &RemediationArtifact) -> String {
    format!(
        "The {} has been downloaded. Install it now?",
        artifact_noun(artifact.kind)
    )
}

/// The user declined the download.
pub fn manual_instructions(artifact: &RemediationArtifact) -> String {
    let needed_by = match artifact.kind {
        ArtifactKind::Runtime => "Corona Launcher needs this runtime",
        ArtifactKind::Patch => "the .NET runtime needs this patch",
    };
    format!(
        "You can download and install the {} manually; {needed_by}.\n\n{}",
        artifact_noun(artifact.kind),
        artifact.download_url
    )
}

/// The user declined the install after a successful download.
pub fn saved_locally(artifact: &RemediationArtifact, path: &Path) -> String {
    format!(
        "The downloaded {} was saved to {}. Please install it manually.",
        artifact_noun(artifact.kind),
        path.display()
    )
}

pub fn installed(artifact: &RemediationArtifact, restart_required: bool) -> String {
    let mut text = format!(
        "The {} was installed. Please start Corona Launcher again.",
        artifact_noun(artifact.kind)
    );
    if restart_required {
        text.push_str("\nWindows must be restarted to finish the installation.");
    }
    text
}

/// Installed, and the launcher is about to try the hosting load again.
pub fn installed_retrying(artifact: &RemediationArtifact, restart_required: bool) -> String {
    let mut text = format!(
        "The {} was installed. Corona Launcher will now try to start again.",
        artifact_noun(artifact.kind)
    );
    if restart_required {
        text.push_str("\nIf it still fails, restart Windows to finish the installation.");
    }
    text
}

pub fn transfer_failed(artifact: &RemediationArtifact, error: &RemediationError) -> String {
    format!(
        "Downloading the {} failed.\n\n{error}\n\nYou can download it manually from:\n{}",
        artifact_noun(artifact.kind),
        artifact.download_url
    )
}

/// Install failures keep the downloaded file so the user can retry by hand.
/// The file is only pointed to if it is actually there.
pub fn install_failed(artifact: &RemediationArtifact, path: &Path, error: &RemediationError) -> String {
    let noun = artifact_noun(artifact.kind);
    if path.is_file() {
        format!(
            "Installing the {noun} failed.\n\n{error}\n\nThe installer was kept at {}; you can run it manually.",
            path.display()
        )
    } else {
        format!(
            "Installing the {noun} failed.\n\n{error}\n\nThe downloaded file was not found at {}. You can download it manually from:\n{}",
            path.display(),
            artifact.download_url
        )
    }
}

pub fn patch_not_applicable(os: &OsVersion) -> String {
    format!(
        "No compatibility patch is available for {os}. Please reinstall Corona Launcher."
    )
}

pub fn platform_fatal(error: &PlatformError) -> String {
    format!("Corona Launcher cannot determine how to repair this system.\n\n{error}")
}

pub fn config_error(error: &ConfigError) -> String {
    format!("The launcher configuration is invalid.\n\n{error}")
}

pub fn fault(fault: &Fault) -> String {
    match &fault.location {
        Some(location) => format!(
            "Corona Launcher stopped because of an internal error.\n\n{}\n({location})",
            fault.message
        ),
        None => format!(
            "Corona Launcher stopped because of an internal error.\n\n{}",
            fault.message
        ),
    }
}

pub fn confirm_close_progress() -> String {
    "An installation step is still running. Close this window anyway?".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Architecture;
    use crate::process::ProcessExit;
    use crate::registry::{RemediationRegistry, DEFAULT_BASE_URL};

    #[test]
    fn test_load_failure_embeds_diagnostic() {
        let text = load_failure(
            FailureKind::MissingHostAssembly,
            Path::new("CoronaLauncher.dll"),
            "0x80008096 (FrameworkMissingFailure)",
        );
        assert!(text.contains("CoronaLauncher.dll"));
        assert!(text.contains("compatibility patch"));
        assert!(text.contains("0x80008096"));
    }

    #[test]
    fn test_manual_instructions_include_url() {
        let registry = RemediationRegistry::new(DEFAULT_BASE_URL).unwrap();
        let artifact = registry.lookup(FailureKind::MissingManagedRuntime, Architecture::X64);
        let text = manual_instructions(&artifact);
        assert!(text.contains(artifact.download_url.as_str()));
    }

    #[test]
    fn test_install_failed_only_points_to_existing_file() {
        let registry = RemediationRegistry::new(DEFAULT_BASE_URL).unwrap();
        let artifact = registry.lookup(FailureKind::MissingManagedRuntime, Architecture::X64);
        let error = RemediationError::Install {
            artifact: artifact.file_name.clone(),
            exit: ProcessExit::from_code(1603),
        };
        let dir = tempfile::tempdir().unwrap();
        let path = artifact.local_path(dir.path());

        let missing = install_failed(&artifact, &path, &error);
        assert!(missing.contains("was not found"));
        assert!(!missing.contains("was kept"));
        assert!(missing.contains(artifact.download_url.as_str()));

        std::fs::write(&path, b"installer").unwrap();
        let kept = install_failed(&artifact, &path, &error);
        assert!(kept.contains("was kept at"));
        assert!(kept.contains(&path.display().to_string()));
    }

    #[test]
    fn test_retry_wording_does_not_ask_for_relaunch() {
        let registry = RemediationRegistry::new(DEFAULT_BASE_URL).unwrap();
        let artifact = registry.lookup(FailureKind::MissingManagedRuntime, Architecture::X64);
        let text = installed_retrying(&artifact, false);
        assert!(text.contains("installed"));
        assert!(!text.contains("start Corona Launcher again"));
        assert!(installed_retrying(&artifact, true).contains("restart Windows"));
    }

    #[test]
    fn test_installed_mentions_restart_only_when_needed() {
        let registry = RemediationRegistry::new(DEFAULT_BASE_URL).unwrap();
        let artifact = registry.lookup(FailureKind::MissingHostAssembly, Architecture::X86);
        assert!(installed(&artifact, false).contains("installed"));
        assert!(!installed(&artifact, false).contains("restarted"));
        assert!(installed(&artifact, true).contains("restarted"));
    }
}
