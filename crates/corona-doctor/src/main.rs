//! Corona Doctor - support tool for Corona launcher installs
//!
//! ## Commands
//!
//! - `check`: Run the hosting load (without starting the entry) and report
//!   which remediation the launcher would offer
//! - `artifacts`: List the remediation artifact table
//! - `remediate`: Download and install one artifact from a console

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use corona_bootstrap::config::LoggingConfig;
use corona_bootstrap::dialog::ConsentGate;
use corona_bootstrap::hosting::{check_entry_component, executable_dir};
use corona_bootstrap::{
    init_tracing, messages, Architecture, ArtifactKind, ConsentMode, ConsoleDialogs, HostFxr,
    HostfxrSearch, HostingLoader, LauncherConfig, NativePlatform, Platform, RemediationArtifact,
    RemediationRegistry, Remediator, SystemInvoker,
};
use serde::Serialize;
use tracing::info;

#[derive(Parser)]
#[command(name = "corona-doctor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Diagnose and repair Corona launcher installs", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Launcher install directory (default: this executable's directory)
    #[arg(long, global = true, env = "CORONA_APP_DIR")]
    app_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the hosting library and check the entry component
    Check,

    /// List remediation artifacts
    Artifacts {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Download and install a remediation artifact
    Remediate {
        /// Artifact family
        #[arg(value_enum)]
        family: Family,

        /// Target architecture (default: this machine)
        #[arg(long)]
        arch: Option<Architecture>,

        /// Stop after the download
        #[arg(long)]
        download_only: bool,

        /// Answer yes to every prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Family {
    Runtime,
    Patch,
}

impl From<Family> for ArtifactKind {
    fn from(family: Family) -> Self {
        match family {
            Family::Runtime => ArtifactKind::Runtime,
            Family::Patch => ArtifactKind::Patch,
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let app_dir = match cli.app_dir {
        Some(dir) => dir,
        None => executable_dir().context("cannot determine the executable directory")?,
    };
    let config = LauncherConfig::load(&app_dir)
        .with_context(|| format!("failed to load configuration from {}", app_dir.display()))?;

    let logging = LoggingConfig {
        level: if cli.verbose {
            "debug".to_string()
        } else {
            config.logging.level.clone()
        },
        json: cli.json_logs || config.logging.json,
    };
    init_tracing(&logging);

    let registry = RemediationRegistry::new(&config.artifact_base_url)?;

    match cli.command {
        Commands::Check => cmd_check(&app_dir, &config, &registry),
        Commands::Artifacts { json } => cmd_artifacts(&registry, &config, json),
        Commands::Remediate {
            family,
            arch,
            download_only,
            yes,
        } => cmd_remediate(
            &app_dir,
            &config,
            &registry,
            family.into(),
            arch,
            download_only,
            yes,
        ),
    }
}

fn cmd_check(
    app_dir: &Path,
    config: &LauncherConfig,
    registry: &RemediationRegistry,
) -> Result<ExitCode> {
    let platform = NativePlatform::new();
    let architecture = platform.current_architecture()?;
    let os = platform.os_version()?;
    println!("Architecture:     {architecture}");
    println!("OS:               {os} (legacy: {})", os.is_legacy());

    let search = HostfxrSearch::new(app_dir)
        .with_explicit(config.hosting_library.clone())
        .with_dotnet_root(config.dotnet_root.clone());
    let mut hostfxr = HostFxr::new(search);

    let failure = match hostfxr.load_hosting_library() {
        Ok(()) => {
            if let Some(path) = hostfxr.library_path() {
                println!("Hosting library:  {}", path.display());
            }
            match check_entry_component(app_dir, &config.entry_component) {
                Ok(path) => {
                    println!("Entry component:  {}", path.display());
                    None
                }
                Err(failure) => Some(failure),
            }
        }
        Err(failure) => Some(failure),
    };

    let Some(failure) = failure else {
        println!();
        println!("✓ The launcher should start normally");
        return Ok(ExitCode::SUCCESS);
    };

    println!();
    println!("✗ {}", failure.kind);
    println!("  {}", failure.diagnostic);

    let artifact = registry.lookup(failure.kind, architecture);
    if artifact.applies_to(&os) {
        println!();
        println!("The launcher would offer: {}", artifact.file_name);
        println!("  {}", artifact.download_url);
        println!(
            "Run `corona-doctor remediate {} --arch {}` to repair.",
            artifact.kind, artifact.architecture
        );
    } else {
        println!();
        println!("{}", messages::patch_not_applicable(&os));
    }
    Ok(ExitCode::FAILURE)
}

#[derive(Debug, Serialize)]
struct ArtifactRow<'a> {
    #[serde(flatten)]
    artifact: &'a RemediationArtifact,
    install_command: String,
}

fn artifact_rows<'a>(registry: &'a RemediationRegistry, download_dir: &Path) -> Vec<ArtifactRow<'a>> {
    registry
        .artifacts()
        .iter()
        .map(|artifact| ArtifactRow {
            artifact,
            install_command: artifact.install_command(download_dir).to_string(),
        })
        .collect()
}

fn cmd_artifacts(
    registry: &RemediationRegistry,
    config: &LauncherConfig,
    json: bool,
) -> Result<ExitCode> {
    let download_dir = config.resolve_download_dir()?;
    let rows = artifact_rows(registry, &download_dir);

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("Base URL: {}", registry.base_url());
    for row in &rows {
        println!();
        println!(
            "{} ({}): {}",
            row.artifact.kind, row.artifact.architecture, row.artifact.file_name
        );
        println!("  url:     {}", row.artifact.download_url);
        println!("  install: {}", row.install_command);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_remediate(
    app_dir: &Path,
    config: &LauncherConfig,
    registry: &RemediationRegistry,
    kind: ArtifactKind,
    arch: Option<Architecture>,
    download_only: bool,
    yes: bool,
) -> Result<ExitCode> {
    let architecture = match arch {
        Some(arch) => arch,
        None => NativePlatform::new().current_architecture()?,
    };
    let artifact = registry.artifact(kind, architecture);
    info!(artifact = %artifact.file_name, "remediating");

    let dialogs = ConsoleDialogs::stdio();
    let mode = if yes { ConsentMode::AssumeYes } else { config.consent };
    let gate = ConsentGate::new(&dialogs, mode);

    if !gate.ask(&messages::offer_download(artifact)) {
        println!("{}", messages::manual_instructions(artifact));
        return Ok(ExitCode::FAILURE);
    }

    let invoker = SystemInvoker;
    let remediator = Remediator::new(
        &invoker,
        config.resolve_downloader(app_dir),
        config.resolve_download_dir()?,
    );

    let path = match remediator.download(artifact) {
        Ok(path) => path,
        Err(err) => {
            eprintln!("{}", messages::transfer_failed(artifact, &err));
            return Ok(ExitCode::FAILURE);
        }
    };
    println!("Downloaded {}", path.display());

    if download_only || !gate.ask(&messages::offer_install(artifact)) {
        println!("{}", messages::saved_locally(artifact, &path));
        return Ok(ExitCode::SUCCESS);
    }

    match remediator.install(artifact) {
        Ok(receipt) => {
            println!("{}", messages::installed(artifact, receipt.restart_required));
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("{}", messages::install_failed(artifact, &path, &err));
            Ok(ExitCode::FAILURE)
        }
    }
}
