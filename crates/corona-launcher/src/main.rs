#![cfg_attr(windows, windows_subsystem = "windows")]
//! Corona Launcher - native entry point of the Corona desktop client
//!
//! Loads the .NET hosting library and runs `CoronaLauncher.dll` with the
//! process arguments, unchanged. When the runtime or the entry component
//! cannot be loaded, the bootstrap offers to download and install the
//! missing prerequisite.
//!
//! The launcher takes no flags of its own; configuration comes from
//! `corona-launcher.json` next to the executable and `CORONA_*` variables.

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use corona_bootstrap::hosting::executable_dir;
use corona_bootstrap::progress::TracingSurface;
use corona_bootstrap::{
    execute_protected, init_tracing, initialize_crash_handling, messages, platform_dialogs,
    BootstrapOptions, Bootstrapper, ConfigError, Dialogs, HostFxr, HostfxrSearch, LauncherConfig,
    NativePlatform, ProgressHost, RemediationRegistry, SystemInvoker, EXIT_FAILURE, VERSION,
};
use tracing::{error, info, warn};

fn main() {
    let dialogs = platform_dialogs();
    initialize_crash_handling(Arc::clone(&dialogs));

    let code = execute_protected(|| match run(Arc::clone(&dialogs)) {
        Ok(code) => code,
        Err(err) => {
            error!(error = %format!("{err:#}"), "launcher failed");
            let text = match err.downcast_ref::<ConfigError>() {
                Some(config) => messages::config_error(config),
                None => format!("{err:#}"),
            };
            dialogs.error(&text);
            EXIT_FAILURE
        }
    });

    std::process::exit(code);
}

fn run(dialogs: Arc<dyn Dialogs>) -> Result<i32> {
    let app_dir = executable_dir().context("cannot determine the launcher directory")?;
    let config = LauncherConfig::load(&app_dir)?;
    init_tracing(&config.logging);
    info!(version = VERSION, app_dir = %app_dir.display(), "corona launcher starting");

    let registry = RemediationRegistry::new(&config.artifact_base_url)?;
    let options = BootstrapOptions {
        entry_component: config.entry_component.clone(),
        consent: config.consent,
        retry_after_remediation: config.retry_after_remediation,
        downloader: config.resolve_downloader(&app_dir),
        download_dir: config.resolve_download_dir()?,
    };

    let search = HostfxrSearch::new(&app_dir)
        .with_explicit(config.hosting_library.clone())
        .with_dotnet_root(config.dotnet_root.clone());
    let mut loader = HostFxr::new(search);
    let platform = NativePlatform::new();
    let invoker = SystemInvoker;

    let runtime = if config.progress.enabled {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("corona-progress")
            .enable_time()
            .build()
            .context("failed to start the progress runtime")?;
        Some(runtime)
    } else {
        None
    };

    let args: Vec<OsString> = std::env::args_os().skip(1).collect();

    let mut bootstrapper =
        Bootstrapper::new(&mut loader, &platform, &registry, &invoker, dialogs, options);
    if let Some(runtime) = &runtime {
        bootstrapper = bootstrapper.with_progress(ProgressHost {
            runtime: runtime.handle().clone(),
            surface: Arc::new(TracingSurface),
            tick: Duration::from_millis(config.progress.tick_ms),
        });
    }

    let outcome = bootstrapper.run(&args);
    let code = outcome.exit_code();
    if let Some(err) = outcome.into_error() {
        warn!(error = %err, exit_code = code, "launch did not reach the managed entry");
    }
    Ok(code)
}
