//! Corona Bootstrap: failure triage and self-healing start-up for the
//! Corona .NET launcher.
//!
//! The native launcher loads the .NET hosting library and runs the managed
//! entry component. When either stage fails, this crate classifies the
//! failure, offers the matching redistributable (desktop runtime or legacy
//! OS patch), downloads it with the bundled downloader, installs it silently
//! and tells the user where things stand.
//!
//! ## Layout
//!
//! - [`platform`]: architecture and OS version oracle
//! - [`registry`]: remediation artifact table
//! - [`process`]: blocking subprocess invoker
//! - [`crash`]: process-wide crash isolation
//! - [`hosting`]: two-stage hosting loader (native `hostfxr`)
//! - [`bootstrap`]: the state machine
//! - [`progress`]: cancellable progress adapter

pub mod bootstrap;
pub mod config;
pub mod crash;
pub mod dialog;
pub mod error;
pub mod hosting;
pub mod messages;
pub mod obs;
pub mod platform;
pub mod process;
pub mod progress;
pub mod registry;
pub mod remediation;
pub mod telemetry;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bootstrap::{
    BootstrapOptions, BootstrapOutcome, BootstrapState, Bootstrapper, ProgressHost,
    RemediationReport,
};
pub use config::LauncherConfig;
pub use crash::{execute_protected, initialize_crash_handling, CrashGuard, Fault};
pub use dialog::{platform_dialogs, ConsentMode, ConsoleDialogs, Dialogs};
pub use error::{
    ConfigError, InvokeError, LauncherError, PlatformError, RemediationError, Result,
};
pub use hosting::{FailureKind, HostFxr, HostfxrSearch, HostingFailure, HostingLoader};
pub use platform::{Architecture, NativePlatform, OsVersion, Platform};
pub use process::{CommandLine, ProcessExit, ProcessInvoker, SystemInvoker};
pub use progress::{show_progress, ProgressControl, ProgressSession, ProgressSurface};
pub use registry::{ArtifactKind, RemediationArtifact, RemediationRegistry};
pub use remediation::{RemediationStage, Remediator};
pub use telemetry::init_tracing;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit code of every launch that did not reach the managed entry.
pub const EXIT_FAILURE: i32 = 1;
