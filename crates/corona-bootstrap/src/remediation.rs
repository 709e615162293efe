//! Download and install pipeline for remediation artifacts.
//!
//! Both steps go through a [`ProcessInvoker`]: the bundled downloader is
//! started with the artifact URL as its only argument inside the download
//! directory, then the artifact's unattended installer runs from the same
//! directory. Downloaded files are not verified; their SHA-256 is logged
//! for support purposes only.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::RemediationError;
use crate::obs;
use crate::process::{CommandLine, ProcessInvoker};
use crate::registry::RemediationArtifact;

/// Step of the remediation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationStage {
    Download,
    Install,
}

impl fmt::Display for RemediationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemediationStage::Download => f.write_str("download"),
            RemediationStage::Install => f.write_str("install"),
        }
    }
}

/// Result of a successful install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallReceipt {
    pub restart_required: bool,
}

pub struct Remediator<'a> {
    invoker: &'a dyn ProcessInvoker,
    downloader: PathBuf,
    download_dir: PathBuf,
}

impl<'a> Remediator<'a> {
    pub fn new(
        invoker: &'a dyn ProcessInvoker,
        downloader: impl Into<PathBuf>,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            invoker,
            downloader: downloader.into(),
            download_dir: download_dir.into(),
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    pub fn download_command(&self, artifact: &RemediationArtifact) -> CommandLine {
        CommandLine::new(&self.downloader)
            .arg(artifact.download_url.as_str())
            .current_dir(&self.download_dir)
    }

    /// Fetch `artifact` into the download directory.
    pub fn download(&self, artifact: &RemediationArtifact) -> Result<PathBuf, RemediationError> {
        let command = self.download_command(artifact);
        let exit = self
            .invoker
            .run_blocking(&command)
            .map_err(|source| RemediationError::Spawn {
                stage: RemediationStage::Download,
                source,
            })?;

        let success = exit.success();
        obs::emit_remediation_stage(&RemediationStage::Download, &artifact.file_name, success);
        if !success {
            return Err(RemediationError::Transfer {
                url: artifact.download_url.to_string(),
                exit,
            });
        }

        let path = artifact.local_path(&self.download_dir);
        match file_sha256(&path) {
            Ok(digest) => info!(
                artifact = %artifact.file_name,
                sha256 = %digest,
                "artifact downloaded"
            ),
            Err(e) => warn!(
                path = %path.display(),
                error = %e,
                "downloader reported success but the artifact is not readable"
            ),
        }
        Ok(path)
    }

    /// Run the unattended installer for a downloaded `artifact`.
    pub fn install(&self, artifact: &RemediationArtifact) -> Result<InstallReceipt, RemediationError> {
        let command = artifact.install_command(&self.download_dir);
        let exit = self
            .invoker
            .run_blocking(&command)
            .map_err(|source| RemediationError::Spawn {
                stage: RemediationStage::Install,
                source,
            })?;

        let outcome = exit
            .code()
            .and_then(|code| artifact.installer.interpret_exit(code));
        obs::emit_remediation_stage(
            &RemediationStage::Install,
            &artifact.file_name,
            outcome.is_some(),
        );

        match outcome {
            Some(restart_required) => Ok(InstallReceipt { restart_required }),
            None => Err(RemediationError::Install {
                artifact: artifact.file_name.clone(),
                exit,
            }),
        }
    }
}

/// Hex SHA-256 of a file.
pub fn file_sha256(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosting::FailureKind;
    use crate::platform::Architecture;
    use crate::process::ProcessExit;
    use crate::registry::{RemediationRegistry, DEFAULT_BASE_URL};
    use crate::testing::RecordingInvoker;

    fn runtime_x64() -> RemediationArtifact {
        RemediationRegistry::new(DEFAULT_BASE_URL)
            .unwrap()
            .lookup(FailureKind::MissingManagedRuntime, Architecture::X64)
    }

    #[test]
    fn test_download_invokes_downloader_with_url_only() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = RecordingInvoker::default();
        let remediator = Remediator::new(&invoker, "tools/aria2c.exe", dir.path());
        let artifact = runtime_x64();

        let path = remediator.download(&artifact).unwrap();
        assert_eq!(path, dir.path().join(&artifact.file_name));

        let commands = invoker.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].program, PathBuf::from("tools/aria2c.exe"));
        assert_eq!(commands[0].args, [artifact.download_url.as_str()]);
        assert_eq!(commands[0].current_dir.as_deref(), Some(dir.path()));
    }

    #[test]
    fn test_download_nonzero_is_transfer_failure() {
        let invoker = RecordingInvoker::default().with_exits([ProcessExit::from_code(3)]);
        let remediator = Remediator::new(&invoker, "aria2c", ".");

        let err = remediator.download(&runtime_x64()).unwrap_err();
        assert!(matches!(err, RemediationError::Transfer { .. }));
        assert_eq!(err.stage(), RemediationStage::Download);
    }

    #[test]
    fn test_download_spawn_failure_is_tagged_with_stage() {
        let invoker = RecordingInvoker::default().failing_spawn();
        let remediator = Remediator::new(&invoker, "missing-downloader", ".");

        let err = remediator.download(&runtime_x64()).unwrap_err();
        assert!(matches!(
            err,
            RemediationError::Spawn {
                stage: RemediationStage::Download,
                ..
            }
        ));
    }

    #[test]
    fn test_install_reboot_required_is_success() {
        let invoker = RecordingInvoker::default().with_exits([ProcessExit::from_code(3010)]);
        let remediator = Remediator::new(&invoker, "aria2c", "downloads");

        let receipt = remediator.install(&runtime_x64()).unwrap();
        assert!(receipt.restart_required);
    }

    #[test]
    fn test_install_failure_keeps_exit_code() {
        let invoker = RecordingInvoker::default().with_exits([ProcessExit::from_code(1603)]);
        let remediator = Remediator::new(&invoker, "aria2c", "downloads");

        let err = remediator.install(&runtime_x64()).unwrap_err();
        assert_eq!(err.stage(), RemediationStage::Install);
        assert!(err.to_string().contains("1603"));
    }

    #[test]
    fn test_file_sha256() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.bin");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            file_sha256(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
