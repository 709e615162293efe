//! Remediation artifact registry.
//!
//! Static table of the redistributables the launcher can fetch: the .NET
//! desktop runtime installer and the legacy-OS compatibility patch, one per
//! architecture. Only the base URL is configurable.

use std::path::{Path, PathBuf};

use serde::Serialize;
use url::Url;

use crate::error::ConfigError;
use crate::hosting::FailureKind;
use crate::platform::{Architecture, OsVersion};
use crate::process::CommandLine;

/// Content-delivery base for every artifact.
pub const DEFAULT_BASE_URL: &str = "http://file.rmrts.com/srv/cor/redist/";

/// Artifact family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// OS compatibility patch (`.msu`).
    Patch,
    /// Managed runtime installer (`.exe`).
    Runtime,
}

impl ArtifactKind {
    /// The family that remediates a hosting failure.
    pub fn for_failure(kind: FailureKind) -> Self {
        match kind {
            FailureKind::MissingManagedRuntime => ArtifactKind::Runtime,
            FailureKind::MissingHostAssembly => ArtifactKind::Patch,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Patch => "patch",
            ArtifactKind::Runtime => "runtime",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which OS versions an artifact applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OsRequirement {
    Any,
    LegacyOnly,
}

/// How a downloaded artifact is installed unattended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstallerInvocation {
    /// `wusa.exe <package> /quiet /norestart`
    WindowsUpdatePackage,
    /// Run the downloaded executable itself with `args`.
    Executable { args: &'static [&'static str] },
}

impl InstallerInvocation {
    /// Build the command that installs the artifact stored at `artifact_path`.
    pub fn command_line(&self, artifact_path: &Path) -> CommandLine {
        match self {
            InstallerInvocation::WindowsUpdatePackage => CommandLine::new("wusa.exe")
                .arg(artifact_path)
                .args(["/quiet", "/norestart"]),
            InstallerInvocation::Executable { args } => {
                CommandLine::new(artifact_path).args(args.iter())
            }
        }
    }

    /// Whether an installer exit code means the artifact is now installed.
    ///
    /// Returns `Some(restart_required)` on success.
    pub fn interpret_exit(&self, code: i32) -> Option<bool> {
        const ERROR_SUCCESS_REBOOT_INITIATED: i32 = 1641;
        const ERROR_SUCCESS_REBOOT_REQUIRED: i32 = 3010;
        // WU_S_ALREADY_INSTALLED
        const WUSA_ALREADY_INSTALLED: i32 = 0x0024_0006;

        match (self, code) {
            (_, 0) => Some(false),
            (_, ERROR_SUCCESS_REBOOT_REQUIRED | ERROR_SUCCESS_REBOOT_INITIATED) => Some(true),
            (InstallerInvocation::WindowsUpdatePackage, WUSA_ALREADY_INSTALLED) => Some(false),
            _ => None,
        }
    }
}

/// One downloadable remediation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemediationArtifact {
    pub kind: ArtifactKind,
    pub architecture: Architecture,
    pub file_name: String,
    pub download_url: Url,
    pub installer: InstallerInvocation,
    pub os_requirement: OsRequirement,
}

impl RemediationArtifact {
    pub fn applies_to(&self, os: &OsVersion) -> bool {
        match self.os_requirement {
            OsRequirement::Any => true,
            OsRequirement::LegacyOnly => os.is_legacy(),
        }
    }

    /// Where the downloader leaves the file inside `download_dir`.
    pub fn local_path(&self, download_dir: &Path) -> PathBuf {
        download_dir.join(&self.file_name)
    }

    pub fn install_command(&self, download_dir: &Path) -> CommandLine {
        self.installer
            .command_line(&self.local_path(download_dir))
            .current_dir(download_dir)
    }
}

struct ArtifactSpec {
    kind: ArtifactKind,
    architecture: Architecture,
    file_name: &'static str,
    installer: InstallerInvocation,
    os_requirement: OsRequirement,
}

const RUNTIME_INSTALLER: InstallerInvocation = InstallerInvocation::Executable {
    args: &["/install", "/quiet", "/norestart"],
};

// Ordered by `slot()`.
const ARTIFACTS: [ArtifactSpec; 4] = [
    ArtifactSpec {
        kind: ArtifactKind::Patch,
        architecture: Architecture::X86,
        file_name: "Windows6.1-KB3063858-x86-v0.2.msu",
        installer: InstallerInvocation::WindowsUpdatePackage,
        os_requirement: OsRequirement::LegacyOnly,
    },
    ArtifactSpec {
        kind: ArtifactKind::Patch,
        architecture: Architecture::X64,
        file_name: "Windows6.1-KB3063858-x64-v0.2.msu",
        installer: InstallerInvocation::WindowsUpdatePackage,
        os_requirement: OsRequirement::LegacyOnly,
    },
    ArtifactSpec {
        kind: ArtifactKind::Runtime,
        architecture: Architecture::X86,
        file_name: "windowsdesktop-runtime-6.0.5-win-x86-v0.2.exe",
        installer: RUNTIME_INSTALLER,
        os_requirement: OsRequirement::Any,
    },
    ArtifactSpec {
        kind: ArtifactKind::Runtime,
        architecture: Architecture::X64,
        file_name: "windowsdesktop-runtime-6.0.5-win-x64-v0.2.exe",
        installer: RUNTIME_INSTALLER,
        os_requirement: OsRequirement::Any,
    },
];

fn slot(kind: ArtifactKind, architecture: Architecture) -> usize {
    match (kind, architecture) {
        (ArtifactKind::Patch, Architecture::X86) => 0,
        (ArtifactKind::Patch, Architecture::X64) => 1,
        (ArtifactKind::Runtime, Architecture::X86) => 2,
        (ArtifactKind::Runtime, Architecture::X64) => 3,
    }
}

/// Immutable artifact table resolved against one base URL.
#[derive(Debug, Clone)]
pub struct RemediationRegistry {
    base_url: Url,
    artifacts: Vec<RemediationArtifact>,
}

impl RemediationRegistry {
    /// Resolve every artifact against `base_url`.
    ///
    /// A missing trailing slash is added to the URL path so the base keeps
    /// its last segment when file names are joined onto it. A query (e.g. a
    /// CDN signature) is carried over to every artifact URL; a fragment is
    /// rejected.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason,
        };

        let mut base = Url::parse(base_url.trim()).map_err(|e| invalid(e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {}", base.scheme())));
        }
        if base.fragment().is_some() {
            return Err(invalid("fragments are not supported".to_string()));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let query = base.query().map(str::to_string);

        let artifacts = ARTIFACTS
            .iter()
            .map(|spec| {
                let mut download_url = base
                    .join(spec.file_name)
                    .map_err(|e| invalid(e.to_string()))?;
                download_url.set_query(query.as_deref());
                Ok(RemediationArtifact {
                    kind: spec.kind,
                    architecture: spec.architecture,
                    file_name: spec.file_name.to_string(),
                    download_url,
                    installer: spec.installer,
                    os_requirement: spec.os_requirement,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            base_url: base,
            artifacts,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Artifact that remediates `failure` on `architecture`.
    pub fn lookup(&self, failure: FailureKind, architecture: Architecture) -> RemediationArtifact {
        self.artifact(ArtifactKind::for_failure(failure), architecture)
            .clone()
    }

    pub fn artifact(&self, kind: ArtifactKind, architecture: Architecture) -> &RemediationArtifact {
        &self.artifacts[slot(kind, architecture)]
    }

    pub fn artifacts(&self) -> &[RemediationArtifact] {
        &self.artifacts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAILURES: [FailureKind; 2] = [
        FailureKind::MissingManagedRuntime,
        FailureKind::MissingHostAssembly,
    ];

    #[test]
    fn test_lookup_is_total_and_architecture_correct() {
        let registry = RemediationRegistry::new(DEFAULT_BASE_URL).unwrap();

        for failure in FAILURES {
            for arch in Architecture::ALL {
                let artifact = registry.lookup(failure, arch);
                assert_eq!(artifact.architecture, arch);
                assert_eq!(artifact.kind, ArtifactKind::for_failure(failure));
                assert!(artifact.file_name.contains(arch.as_str()));
                assert!(artifact.download_url.as_str().starts_with(DEFAULT_BASE_URL));
                assert!(artifact.download_url.as_str().ends_with(&artifact.file_name));
            }
        }
    }

    #[test]
    fn test_failure_kind_maps_to_family() {
        assert_eq!(
            ArtifactKind::for_failure(FailureKind::MissingManagedRuntime),
            ArtifactKind::Runtime
        );
        assert_eq!(
            ArtifactKind::for_failure(FailureKind::MissingHostAssembly),
            ArtifactKind::Patch
        );
    }

    #[test]
    fn test_base_url_without_trailing_slash_keeps_path() {
        let registry = RemediationRegistry::new("https://mirror.example.com/corona/redist").unwrap();
        let artifact = registry.lookup(FailureKind::MissingManagedRuntime, Architecture::X64);
        assert_eq!(
            artifact.download_url.as_str(),
            "https://mirror.example.com/corona/redist/windowsdesktop-runtime-6.0.5-win-x64-v0.2.exe"
        );
    }

    #[test]
    fn test_base_url_query_is_kept_after_file_name() {
        let registry = RemediationRegistry::new("https://cdn.example.com/redist?sig=abc").unwrap();
        let artifact = registry.lookup(FailureKind::MissingManagedRuntime, Architecture::X64);
        assert_eq!(
            artifact.download_url.as_str(),
            "https://cdn.example.com/redist/windowsdesktop-runtime-6.0.5-win-x64-v0.2.exe?sig=abc"
        );
        assert_eq!(registry.base_url().path(), "/redist/");
    }

    #[test]
    fn test_rejects_fragment_in_base() {
        assert!(matches!(
            RemediationRegistry::new("https://cdn.example.com/redist/#latest"),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn test_rejects_non_http_base() {
        assert!(matches!(
            RemediationRegistry::new("ftp://mirror.example.com/"),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
        assert!(RemediationRegistry::new("not a url").is_err());
    }

    #[test]
    fn test_patch_applies_only_to_legacy_os() {
        let registry = RemediationRegistry::new(DEFAULT_BASE_URL).unwrap();
        let patch = registry.lookup(FailureKind::MissingHostAssembly, Architecture::X86);
        let runtime = registry.lookup(FailureKind::MissingManagedRuntime, Architecture::X86);

        let win7 = OsVersion::windows_nt(6, 1, 7601);
        let win10 = OsVersion::windows_nt(10, 0, 19045);
        assert!(patch.applies_to(&win7));
        assert!(!patch.applies_to(&win10));
        assert!(runtime.applies_to(&win10));
    }

    #[test]
    fn test_install_commands() {
        let registry = RemediationRegistry::new(DEFAULT_BASE_URL).unwrap();
        let dir = Path::new("downloads");

        let patch = registry.artifact(ArtifactKind::Patch, Architecture::X64);
        let cmd = patch.install_command(dir);
        assert_eq!(cmd.program, PathBuf::from("wusa.exe"));
        assert_eq!(cmd.args[0], dir.join("Windows6.1-KB3063858-x64-v0.2.msu").into_os_string());
        assert_eq!(&cmd.args[1..], ["/quiet", "/norestart"]);

        let runtime = registry.artifact(ArtifactKind::Runtime, Architecture::X64);
        let cmd = runtime.install_command(dir);
        assert_eq!(cmd.program, dir.join("windowsdesktop-runtime-6.0.5-win-x64-v0.2.exe"));
        assert_eq!(cmd.args, ["/install", "/quiet", "/norestart"]);
    }

    #[test]
    fn test_installer_exit_interpretation() {
        let wusa = InstallerInvocation::WindowsUpdatePackage;
        assert_eq!(wusa.interpret_exit(0), Some(false));
        assert_eq!(wusa.interpret_exit(3010), Some(true));
        assert_eq!(wusa.interpret_exit(0x0024_0006), Some(false));
        assert_eq!(wusa.interpret_exit(1), None);

        assert_eq!(RUNTIME_INSTALLER.interpret_exit(1641), Some(true));
        assert_eq!(RUNTIME_INSTALLER.interpret_exit(0x0024_0006), None);
        assert_eq!(RUNTIME_INSTALLER.interpret_exit(1603), None);
    }
}
