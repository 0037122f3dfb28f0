//! Configuration: where the application list comes from and how it is
//! loaded, reloaded and watched

mod loader;
mod watcher;

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

pub use loader::{load_config_file, parse_config, validate_path, ConfigReloader, ReloadOutcome};
pub use watcher::ConfigWatcher;

const APP_DIR_NAME: &str = "modswap";
pub const CONFIG_FILE_NAME: &str = "config";

/// Errors locating, validating or reading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{}: No such file or directory", .0.display())]
    NotFound(PathBuf),

    #[error("{}: Not a regular file", .0.display())]
    NotRegularFile(PathBuf),

    #[error("{}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("{}: Failed to create directory: {source}", .path.display())]
    CreateDirectory { path: PathBuf, source: io::Error },

    #[error("could not determine the per-user configuration directory")]
    NoConfigDir,

    #[error("{}: failed to watch for changes: {source}", .path.display())]
    Watch { path: PathBuf, source: notify::Error },
}

/// Per-user application directory (Application Support on macOS)
#[derive(Debug, Clone)]
pub struct AppDirs {
    pub data_dir: PathBuf,
}

impl AppDirs {
    /// Locate the directory from the platform conventions
    pub fn locate() -> Result<Self, ConfigError> {
        let base = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(Self::at(base.join(APP_DIR_NAME)))
    }

    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE_NAME)
    }

    /// Ensure the data directory exists
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        if self.data_dir.is_dir() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.data_dir).map_err(|source| ConfigError::CreateDirectory {
            path: self.data_dir.clone(),
            source,
        })?;
        info!(path = %self.data_dir.display(), "created configuration directory");
        Ok(())
    }
}

/// What the daemon starts with
#[derive(Debug)]
pub struct InitialConfig {
    pub names: Vec<String>,
    /// Open handle on the config file, present when it should be watched
    pub watch: Option<File>,
}

fn missing(path: &Path, is_default: bool) -> Result<InitialConfig, ConfigError> {
    if !is_default {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    info!(
        path = %path.display(),
        "no configuration file - starting with empty configuration"
    );
    Ok(InitialConfig {
        names: Vec::new(),
        watch: None,
    })
}

/// Where the desired application names come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Given on the command line; never reloaded
    Apps(Vec<String>),
    /// Read from a file, which is watched and reloaded on SIGHUP
    File { path: PathBuf, is_default: bool },
}

impl ConfigSource {
    /// Apps on the command line win; otherwise the explicit config path,
    /// otherwise the default file under `dirs` (creating its directory).
    pub fn resolve(
        apps: Vec<String>,
        config: Option<PathBuf>,
        dirs: impl FnOnce() -> Result<AppDirs, ConfigError>,
    ) -> Result<Self, ConfigError> {
        if !apps.is_empty() {
            return Ok(Self::Apps(apps));
        }

        if let Some(path) = config {
            return Ok(Self::File {
                path,
                is_default: false,
            });
        }

        let dirs = dirs()?;
        dirs.ensure_dirs()?;
        Ok(Self::File {
            path: dirs.config_file(),
            is_default: true,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Apps(_) => None,
            Self::File { path, .. } => Some(path),
        }
    }

    /// Reloader for file sources; static app lists are never reloaded
    pub fn reloader(&self) -> Option<ConfigReloader> {
        match self {
            Self::Apps(_) => None,
            Self::File { path, is_default } => Some(ConfigReloader::new(path.clone(), *is_default)),
        }
    }

    /// Load the names to start with.
    ///
    /// A missing default file means an empty configuration and nothing to
    /// watch. Any other failure is fatal to startup.
    pub fn load_initial(&self) -> Result<InitialConfig, ConfigError> {
        let (path, is_default) = match self {
            Self::Apps(apps) => {
                return Ok(InitialConfig {
                    names: apps.clone(),
                    watch: None,
                })
            }
            Self::File { path, is_default } => (path, *is_default),
        };

        // Opened before validation and before the watch is registered, so
        // the handle the watcher holds names the file that was read.
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return missing(path, is_default);
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.clone(),
                    source,
                })
            }
        };

        match load_config_file(path) {
            Ok(names) => {
                info!(path = %path.display(), "configuration loaded");
                Ok(InitialConfig {
                    names,
                    watch: Some(file),
                })
            }
            Err(ConfigError::NotFound(_)) => missing(path, is_default),
            Err(e) => Err(e),
        }
    }
}
