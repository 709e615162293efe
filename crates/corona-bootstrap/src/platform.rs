//! Architecture / OS oracle.
//!
//! Pure queries about the machine the launcher runs on. The answers never
//! change within a process, so [`NativePlatform`] caches them after the first
//! successful query.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

/// Processor architecture a remediation artifact targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    X86,
    X64,
}

impl Architecture {
    pub const ALL: [Architecture; 2] = [Architecture::X86, Architecture::X64];

    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::X86 => "x86",
            Architecture::X64 => "x64",
        }
    }

    /// Map a Windows `PROCESSOR_ARCHITECTURE_*` code.
    ///
    /// IA64 is folded into x64 the same way the redistributables are.
    pub fn from_processor_code(code: u16) -> Result<Self, PlatformError> {
        const INTEL: u16 = 0;
        const IA64: u16 = 6;
        const AMD64: u16 = 9;

        match code {
            INTEL => Ok(Architecture::X86),
            IA64 | AMD64 => Ok(Architecture::X64),
            other => Err(PlatformError::UnsupportedArchitecture(format!(
                "processor architecture code {other}"
            ))),
        }
    }

    /// Map a Rust `target_arch` name.
    pub fn from_target_arch(arch: &str) -> Result<Self, PlatformError> {
        match arch {
            "x86" => Ok(Architecture::X86),
            "x86_64" => Ok(Architecture::X64),
            other => Err(PlatformError::UnsupportedArchitecture(other.to_string())),
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x86" | "i386" | "i686" => Ok(Architecture::X86),
            "x64" | "x86_64" | "amd64" => Ok(Architecture::X64),
            other => Err(PlatformError::UnsupportedArchitecture(other.to_string())),
        }
    }
}

/// OS family, as far as remediation cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsFamily {
    WindowsNt,
    Other,
}

/// Operating system version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsVersion {
    pub family: OsFamily,
    pub major: u32,
    pub minor: u32,
    pub build: u32,
}

impl OsVersion {
    /// NT 6.1 (Windows 7 / Server 2008 R2) needs KB3063858 before .NET 6 runs.
    pub const LEGACY_NT: (u32, u32) = (6, 1);

    pub fn windows_nt(major: u32, minor: u32, build: u32) -> Self {
        Self {
            family: OsFamily::WindowsNt,
            major,
            minor,
            build,
        }
    }

    pub fn other() -> Self {
        Self {
            family: OsFamily::Other,
            major: 0,
            minor: 0,
            build: 0,
        }
    }

    /// True for the one OS class the patch family exists for.
    pub fn is_legacy(&self) -> bool {
        self.family == OsFamily::WindowsNt && (self.major, self.minor) == Self::LEGACY_NT
    }
}

impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.family {
            OsFamily::WindowsNt => {
                write!(f, "Windows NT {}.{}.{}", self.major, self.minor, self.build)
            }
            OsFamily::Other => f.write_str(std::env::consts::OS),
        }
    }
}

/// Oracle seam used by the state machine.
pub trait Platform {
    fn current_architecture(&self) -> Result<Architecture, PlatformError>;

    fn os_version(&self) -> Result<OsVersion, PlatformError>;

    fn is_legacy_os(&self) -> Result<bool, PlatformError> {
        self.os_version().map(|v| v.is_legacy())
    }
}

/// The real machine.
#[derive(Debug, Default)]
pub struct NativePlatform {
    architecture: OnceLock<Architecture>,
    os_version: OnceLock<OsVersion>,
}

impl NativePlatform {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Platform for NativePlatform {
    fn current_architecture(&self) -> Result<Architecture, PlatformError> {
        if let Some(arch) = self.architecture.get() {
            return Ok(*arch);
        }
        let arch = native::architecture()?;
        tracing::debug!(architecture = %arch, "detected processor architecture");
        Ok(*self.architecture.get_or_init(|| arch))
    }

    fn os_version(&self) -> Result<OsVersion, PlatformError> {
        if let Some(version) = self.os_version.get() {
            return Ok(*version);
        }
        let version = native::os_version()?;
        tracing::debug!(os = %version, legacy = version.is_legacy(), "detected OS version");
        Ok(*self.os_version.get_or_init(|| version))
    }
}

#[cfg(windows)]
mod native {
    use windows::Wdk::System::SystemServices::RtlGetVersion;
    use windows::Win32::System::SystemInformation::{
        GetNativeSystemInfo, OSVERSIONINFOW, SYSTEM_INFO,
    };

    use super::{Architecture, OsVersion};
    use crate::error::PlatformError;

    pub(super) fn architecture() -> Result<Architecture, PlatformError> {
        let mut info = SYSTEM_INFO::default();
        // SAFETY: `info` is a valid, writable SYSTEM_INFO; the union read
        // matches what GetNativeSystemInfo fills in.
        let code = unsafe {
            GetNativeSystemInfo(&mut info);
            info.Anonymous.Anonymous.wProcessorArchitecture.0
        };
        Architecture::from_processor_code(code)
    }

    pub(super) fn os_version() -> Result<OsVersion, PlatformError> {
        let mut info = OSVERSIONINFOW {
            dwOSVersionInfoSize: std::mem::size_of::<OSVERSIONINFOW>() as u32,
            ..Default::default()
        };
        // SAFETY: `info` is sized and writable as RtlGetVersion requires.
        let status = unsafe { RtlGetVersion(&mut info) };
        if status.is_err() {
            return Err(PlatformError::VersionQuery(format!(
                "RtlGetVersion returned 0x{:08X}",
                status.0 as u32
            )));
        }
        Ok(OsVersion::windows_nt(
            info.dwMajorVersion,
            info.dwMinorVersion,
            info.dwBuildNumber,
        ))
    }
}

#[cfg(not(windows))]
mod native {
    use super::{Architecture, OsVersion};
    use crate::error::PlatformError;

    pub(super) fn architecture() -> Result<Architecture, PlatformError> {
        Architecture::from_target_arch(std::env::consts::ARCH)
    }

    pub(super) fn os_version() -> Result<OsVersion, PlatformError> {
        Ok(OsVersion::other())
    }
}
