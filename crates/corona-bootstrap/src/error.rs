//! Error taxonomy for the bootstrap.
//!
//! Component errors are small `thiserror` enums. [`LauncherError`] is the
//! top-level taxonomy every terminal failure of a launch reduces to.

use std::path::PathBuf;

use crate::hosting::{FailureKind, HostingFailure};
use crate::process::ProcessExit;
use crate::remediation::RemediationStage;

/// Errors from the architecture / OS oracle. Always fatal for the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("unsupported processor architecture: {0}")]
    UnsupportedArchitecture(String),

    #[error("operating system version query failed: {0}")]
    VersionQuery(String),
}

/// A subprocess could not be started at all.
///
/// Kept apart from a process that started and exited non-zero, which is
/// reported as a [`ProcessExit`].
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of the download / install pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RemediationError {
    #[error("download of {url} failed: downloader {exit}")]
    Transfer { url: String, exit: ProcessExit },

    #[error("installation of {artifact} failed: installer {exit}")]
    Install { artifact: String, exit: ProcessExit },

    #[error("{stage} step could not start: {source}")]
    Spawn {
        stage: RemediationStage,
        #[source]
        source: InvokeError,
    },
}

impl RemediationError {
    /// The pipeline stage this failure belongs to.
    pub fn stage(&self) -> RemediationStage {
        match self {
            RemediationError::Transfer { .. } => RemediationStage::Download,
            RemediationError::Install { .. } => RemediationStage::Install,
            RemediationError::Spawn { stage, .. } => *stage,
        }
    }
}

/// Configuration could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("invalid artifact base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// Top-level launcher error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum LauncherError {
    #[error(transparent)]
    Spawn(#[from] InvokeError),

    #[error("hosting load failed: {0}")]
    HostingLoad(#[from] HostingFailure),

    #[error("remediation for {0} was declined by the user")]
    RemediationDeclined(FailureKind),

    #[error("remediation transfer failed: {url} ({exit})")]
    RemediationTransfer { url: String, exit: ProcessExit },

    #[error("remediation install failed: {artifact} ({exit})")]
    RemediationInstall { artifact: String, exit: ProcessExit },

    #[error("unhandled fault: {0}")]
    UnhandledFault(String),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<RemediationError> for LauncherError {
    fn from(err: RemediationError) -> Self {
        match err {
            RemediationError::Transfer { url, exit } => {
                LauncherError::RemediationTransfer { url, exit }
            }
            RemediationError::Install { artifact, exit } => {
                LauncherError::RemediationInstall { artifact, exit }
            }
            RemediationError::Spawn { source, .. } => LauncherError::Spawn(source),
        }
    }
}

/// Result type for bootstrap operations.
pub type Result<T> = std::result::Result<T, LauncherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_error_keeps_os_reason() {
        let err = InvokeError::Spawn {
            program: "tools/aria2c.exe".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        let msg = err.to_string();
        assert!(msg.contains("tools/aria2c.exe"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_remediation_error_stage() {
        let transfer = RemediationError::Transfer {
            url: "http://example.invalid/a.exe".to_string(),
            exit: ProcessExit::from_code(7),
        };
        let install = RemediationError::Install {
            artifact: "a.exe".to_string(),
            exit: ProcessExit::from_code(1603),
        };
        assert_eq!(transfer.stage(), RemediationStage::Download);
        assert_eq!(install.stage(), RemediationStage::Install);
    }

    #[test]
    fn test_remediation_error_maps_to_distinct_launcher_variants() {
        let transfer: LauncherError = RemediationError::Transfer {
            url: "http://example.invalid/a.exe".to_string(),
            exit: ProcessExit::from_code(7),
        }
        .into();
        let install: LauncherError = RemediationError::Install {
            artifact: "a.exe".to_string(),
            exit: ProcessExit::from_code(1603),
        }
        .into();

        assert!(matches!(transfer, LauncherError::RemediationTransfer { .. }));
        assert!(matches!(install, LauncherError::RemediationInstall { .. }));
        assert!(install.to_string().contains("1603"));
    }

    #[test]
    fn test_hosting_failure_display_keeps_diagnostic() {
        let err: LauncherError =
            HostingFailure::missing_runtime("libhostfxr.so: cannot open shared object file").into();
        assert!(err.to_string().contains("cannot open shared object file"));
    }
}
