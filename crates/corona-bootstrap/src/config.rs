//! Launcher configuration.
//!
//! Built-in defaults, overridden by an optional `corona-launcher.json` next to
//! the executable, overridden by environment variables. Loaded once at start
//! and passed by reference afterwards.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dialog::ConsentMode;
use crate::error::ConfigError;
use crate::registry::DEFAULT_BASE_URL;

pub const CONFIG_FILE_NAME: &str = "corona-launcher.json";

pub const DEFAULT_ENTRY_COMPONENT: &str = "CoronaLauncher.dll";

/// Bundled downloader, relative to the executable directory.
pub const DEFAULT_DOWNLOADER: &str = "tools/aria2c.exe";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when neither `CORONA_LOG` nor `RUST_LOG` is set.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub enabled: bool,
    pub tick_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_ms: 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Managed entry component, relative to the executable directory.
    pub entry_component: PathBuf,
    /// Explicit hosting library path; searched for when unset.
    pub hosting_library: Option<PathBuf>,
    pub dotnet_root: Option<PathBuf>,
    pub artifact_base_url: String,
    pub downloader: PathBuf,
    /// Where artifacts are saved; the working directory when unset.
    pub download_dir: Option<PathBuf>,
    pub consent: ConsentMode,
    /// Retry the hosting load once after a successful install.
    pub retry_after_remediation: bool,
    pub progress: ProgressConfig,
    pub logging: LoggingConfig,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            entry_component: PathBuf::from(DEFAULT_ENTRY_COMPONENT),
            hosting_library: None,
            dotnet_root: None,
            artifact_base_url: DEFAULT_BASE_URL.to_string(),
            downloader: PathBuf::from(DEFAULT_DOWNLOADER),
            download_dir: None,
            consent: ConsentMode::Prompt,
            retry_after_remediation: false,
            progress: ProgressConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl LauncherConfig {
    /// Defaults, then `app_dir/corona-launcher.json` if present, then the
    /// process environment.
    pub fn load(app_dir: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file_or_default(&app_dir.join(CONFIG_FILE_NAME))?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Apply overrides from `lookup`. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("CORONA_ENTRY_COMPONENT") {
            self.entry_component = PathBuf::from(v);
        }
        if let Some(v) = get("CORONA_HOSTFXR_PATH") {
            self.hosting_library = Some(PathBuf::from(v));
        }
        if let Some(v) = get("DOTNET_ROOT") {
            self.dotnet_root = Some(PathBuf::from(v));
        }
        if let Some(v) = get("CORONA_REDIST_URL") {
            self.artifact_base_url = v;
        }
        if let Some(v) = get("CORONA_DOWNLOADER") {
            self.downloader = PathBuf::from(v);
        }
        if let Some(v) = get("CORONA_DOWNLOAD_DIR") {
            self.download_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("CORONA_CONSENT") {
            self.consent = v.parse().map_err(|reason| invalid("CORONA_CONSENT", &v, reason))?;
        }
        if let Some(v) = get("CORONA_RETRY_AFTER_REMEDIATION") {
            self.retry_after_remediation = parse_bool("CORONA_RETRY_AFTER_REMEDIATION", &v)?;
        }
        if let Some(v) = get("CORONA_PROGRESS") {
            self.progress.enabled = parse_bool("CORONA_PROGRESS", &v)?;
        }
        if let Some(v) = get("CORONA_PROGRESS_TICK_MS") {
            self.progress.tick_ms = v
                .trim()
                .parse()
                .map_err(|e: std::num::ParseIntError| invalid("CORONA_PROGRESS_TICK_MS", &v, e.to_string()))?;
        }
        if let Some(v) = get("CORONA_LOG") {
            self.logging.level = v;
        }
        if let Some(v) = get("CORONA_LOG_FORMAT") {
            self.logging.json = v.trim().eq_ignore_ascii_case("json");
        }
        Ok(())
    }

    /// Downloader path; relative paths resolve against `app_dir`.
    pub fn resolve_downloader(&self, app_dir: &Path) -> PathBuf {
        if self.downloader.is_absolute() {
            self.downloader.clone()
        } else {
            app_dir.join(&self.downloader)
        }
    }

    /// Absolute download directory; the working directory when unset.
    ///
    /// Installers run with this directory as their working directory, so a
    /// relative path must not reach them.
    pub fn resolve_download_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.download_dir {
            Some(dir) if dir.is_absolute() => Ok(dir.clone()),
            Some(dir) => Ok(current_dir()?.join(dir)),
            None => current_dir(),
        }
    }
}

fn current_dir() -> Result<PathBuf, ConfigError> {
    std::env::current_dir().map_err(|source| ConfigError::Read {
        path: PathBuf::from("."),
        source,
    })
}

fn invalid(key: &str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value, "expected true or false")),
    }
}
