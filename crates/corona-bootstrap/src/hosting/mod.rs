//! Hosting loader adapter.
//!
//! Wraps the two-stage hosting contract (load the hosting library, then load
//! and run the managed entry component) and turns its failures into a
//! [`FailureKind`] plus the original low-level diagnostic text.
//!
//! # Modules
//!
//! - [`discovery`] — where the hosting library is searched for
//! - [`hostfxr`]   — the native `hostfxr` implementation of [`HostingLoader`]

pub mod discovery;
pub mod hostfxr;

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use discovery::HostfxrSearch;
pub use hostfxr::HostFxr;

/// Classified reason a launch could not reach the managed entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The hosting library itself could not be found or loaded.
    MissingManagedRuntime,
    /// The hosting library loaded but the entry component did not.
    MissingHostAssembly,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::MissingManagedRuntime => f.write_str("missing managed runtime"),
            FailureKind::MissingHostAssembly => f.write_str("missing host assembly"),
        }
    }
}

/// A failed hosting stage with the reason reported by the layer below.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {diagnostic}")]
pub struct HostingFailure {
    pub kind: FailureKind,
    pub diagnostic: String,
}

impl HostingFailure {
    pub fn missing_runtime(diagnostic: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::MissingManagedRuntime,
            diagnostic: diagnostic.into(),
        }
    }

    pub fn missing_host_assembly(diagnostic: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::MissingHostAssembly,
            diagnostic: diagnostic.into(),
        }
    }
}

/// The hosting contract as seen by the state machine.
pub trait HostingLoader {
    /// Stage 1: locate and load the hosting library.
    fn load_hosting_library(&mut self) -> Result<(), HostingFailure>;

    /// Stage 2: load `entry_component` (relative to the executable's
    /// directory) and run it with `args`, returning its exit code.
    fn load_and_run_entry(
        &mut self,
        args: &[OsString],
        entry_component: &Path,
    ) -> Result<i32, HostingFailure>;
}

/// Directory containing the running executable.
pub fn executable_dir() -> std::io::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    exe.parent().map(Path::to_path_buf).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("executable path {} has no parent directory", exe.display()),
        )
    })
}

/// Resolve `entry_component` against the executable directory, never the
/// process working directory.
pub fn resolve_entry_component(app_dir: &Path, entry_component: &Path) -> PathBuf {
    if entry_component.is_absolute() {
        entry_component.to_path_buf()
    } else {
        app_dir.join(entry_component)
    }
}

/// Resolve the entry component and make sure it exists.
pub fn check_entry_component(
    app_dir: &Path,
    entry_component: &Path,
) -> Result<PathBuf, HostingFailure> {
    let path = resolve_entry_component(app_dir, entry_component);
    if path.is_file() {
        Ok(path)
    } else {
        Err(HostingFailure::missing_host_assembly(format!(
            "entry component not found: {}",
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_resolves_against_app_dir() {
        let app_dir = Path::new("/opt/corona");
        assert_eq!(
            resolve_entry_component(app_dir, Path::new("CoronaLauncher.dll")),
            PathBuf::from("/opt/corona/CoronaLauncher.dll")
        );
        assert_eq!(
            resolve_entry_component(app_dir, Path::new("bin/CoronaLauncher.dll")),
            PathBuf::from("/opt/corona/bin/CoronaLauncher.dll")
        );
    }

    #[test]
    fn test_absolute_entry_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let absolute = dir.path().join("CoronaLauncher.dll");
        assert_eq!(
            resolve_entry_component(Path::new("/elsewhere"), &absolute),
            absolute
        );
    }

    #[test]
    fn test_check_entry_component_reports_resolved_path() {
        let dir = tempfile::tempdir().unwrap();
        let failure =
            check_entry_component(dir.path(), Path::new("CoronaLauncher.dll")).unwrap_err();
        assert_eq!(failure.kind, FailureKind::MissingHostAssembly);
        assert!(failure
            .diagnostic
            .contains(&dir.path().join("CoronaLauncher.dll").display().to_string()));

        std::fs::write(dir.path().join("CoronaLauncher.dll"), b"MZ").unwrap();
        assert!(check_entry_component(dir.path(), Path::new("CoronaLauncher.dll")).is_ok());
    }

    #[test]
    fn test_failure_display_embeds_diagnostic() {
        let failure = HostingFailure::missing_runtime("hostfxr.dll: The specified module could not be found.");
        let text = failure.to_string();
        assert!(text.starts_with("missing managed runtime"));
        assert!(text.contains("The specified module could not be found."));
    }
}
