//! Hosting library discovery.
//!
//! Search order:
//! 1. explicit override (`CORONA_HOSTFXR_PATH`)
//! 2. app-local library next to the executable
//! 3. `DOTNET_ROOT/host/fxr/<highest version>/`
//! 4. platform default install roots, same layout as 3

use std::path::{Path, PathBuf};

use tracing::debug;

#[cfg(windows)]
pub const HOSTFXR_FILE_NAME: &str = "hostfxr.dll";
#[cfg(target_os = "macos")]
pub const HOSTFXR_FILE_NAME: &str = "libhostfxr.dylib";
#[cfg(not(any(windows, target_os = "macos")))]
pub const HOSTFXR_FILE_NAME: &str = "libhostfxr.so";

/// Where to look for the hosting library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostfxrSearch {
    pub explicit: Option<PathBuf>,
    pub app_dir: PathBuf,
    pub dotnet_root: Option<PathBuf>,
    pub install_roots: Vec<PathBuf>,
}

impl HostfxrSearch {
    pub fn new(app_dir: impl Into<PathBuf>) -> Self {
        Self {
            explicit: None,
            app_dir: app_dir.into(),
            dotnet_root: None,
            install_roots: default_install_roots(),
        }
    }

    pub fn with_explicit(mut self, path: Option<PathBuf>) -> Self {
        self.explicit = path;
        self
    }

    pub fn with_dotnet_root(mut self, root: Option<PathBuf>) -> Self {
        self.dotnet_root = root;
        self
    }

    pub fn with_install_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.install_roots = roots;
        self
    }

    /// Candidate library paths in search order. Only version directories
    /// that exist are expanded.
    pub fn candidates(&self) -> Vec<PathBuf> {
        if let Some(explicit) = &self.explicit {
            return vec![explicit.clone()];
        }

        let mut out = vec![self.app_dir.join(HOSTFXR_FILE_NAME)];
        for root in self.dotnet_root.iter().chain(self.install_roots.iter()) {
            let fxr = root.join("host").join("fxr");
            match latest_version_dir(&fxr) {
                Some(dir) => out.push(dir.join(HOSTFXR_FILE_NAME)),
                None => out.push(fxr.join("<version>").join(HOSTFXR_FILE_NAME)),
            }
        }
        out
    }

    /// First existing candidate, or a diagnostic listing every place searched.
    pub fn locate(&self) -> Result<PathBuf, String> {
        let candidates = self.candidates();
        for candidate in &candidates {
            if candidate.is_file() {
                debug!(path = %candidate.display(), "located hosting library");
                return Ok(candidate.clone());
            }
        }

        let searched = candidates
            .iter()
            .map(|p| format!("  {}", p.display()))
            .collect::<Vec<_>>()
            .join("\n");
        Err(format!("{HOSTFXR_FILE_NAME} was not found. Searched:\n{searched}"))
    }
}

/// Highest `major.minor.patch[-pre]` directory under `fxr_dir`.
fn latest_version_dir(fxr_dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(fxr_dir).ok()?;
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.join(HOSTFXR_FILE_NAME).is_file())
        .filter_map(|p| {
            let version = p.file_name()?.to_str().and_then(parse_version)?;
            Some((version, p))
        })
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, p)| p)
}

/// Sort key for a runtime version directory name. Releases sort above
/// prereleases of the same numeric version.
fn parse_version(name: &str) -> Option<(Vec<u64>, bool)> {
    let (numeric, pre) = match name.split_once('-') {
        Some((numeric, _)) => (numeric, true),
        None => (name, false),
    };
    let parts = numeric
        .split('.')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    if parts.is_empty() {
        return None;
    }
    Some((parts, !pre))
}

#[cfg(windows)]
fn default_install_roots() -> Vec<PathBuf> {
    ["ProgramFiles", "ProgramW6432"]
        .iter()
        .filter_map(|var| std::env::var_os(var))
        .map(|dir| PathBuf::from(dir).join("dotnet"))
        .fold(Vec::new(), |mut roots, root| {
            if !roots.contains(&root) {
                roots.push(root);
            }
            roots
        })
}

#[cfg(target_os = "macos")]
fn default_install_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("/usr/local/share/dotnet")]
}

#[cfg(not(any(windows, target_os = "macos")))]
fn default_install_roots() -> Vec<PathBuf> {
    ["/usr/share/dotnet", "/usr/lib/dotnet", "/usr/lib64/dotnet"]
        .iter()
        .map(PathBuf::from)
        .collect()
}
