//! Config file validation, parsing and reloading

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::events::{ConfigOrigin, LoopEvent};

use super::ConfigError;

/// Resolve `path` (one level of symlink) and check it names a regular file.
///
/// Errors always report the original path.
pub fn validate_path(path: &Path) -> Result<PathBuf, ConfigError> {
    let resolved = match fs::read_link(path) {
        Ok(target) if target.is_relative() => match path.parent() {
            Some(parent) => parent.join(target),
            None => target,
        },
        Ok(target) => target,
        Err(_) => path.to_path_buf(),
    };

    let metadata = match fs::metadata(&resolved) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    if !metadata.is_file() {
        return Err(ConfigError::NotRegularFile(path.to_path_buf()));
    }

    Ok(resolved)
}

/// Split config text into application names: one per line, trimmed, blank
/// lines dropped, order and duplicates kept.
pub fn parse_config(contents: &str) -> Vec<String> {
    contents
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Validate and read a config file into application names
pub fn load_config_file(path: &Path) -> Result<Vec<String>, ConfigError> {
    let resolved = validate_path(path)?;
    let contents = fs::read_to_string(&resolved).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_config(&contents))
}

/// Result of a reload attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// Replace the desired set with these names
    Apply(Vec<String>),
    /// Something went wrong; keep the current configuration
    Keep,
}

/// Re-reads the config file for the watcher and SIGHUP.
///
/// Runs off the loop thread; the loop only ever sees the resulting
/// `Configure` event.
#[derive(Debug, Clone)]
pub struct ConfigReloader {
    path: PathBuf,
    is_default: bool,
}

impl ConfigReloader {
    pub fn new(path: impl Into<PathBuf>, is_default: bool) -> Self {
        Self {
            path: path.into(),
            is_default,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn reload(&self) -> ReloadOutcome {
        match load_config_file(&self.path) {
            Ok(names) => {
                if names.is_empty() {
                    info!("configuration reloaded: no apps configured");
                } else {
                    info!(apps = %names.join(", "), "configuration reloaded");
                }
                ReloadOutcome::Apply(names)
            }
            Err(ConfigError::NotFound(path)) if self.is_default => {
                info!(
                    path = %path.display(),
                    "configuration file removed - continuing with empty configuration"
                );
                ReloadOutcome::Apply(Vec::new())
            }
            Err(e @ ConfigError::NotRegularFile(_)) => {
                error!(
                    error = %e,
                    "configuration file is no longer valid - continuing with previous configuration"
                );
                ReloadOutcome::Keep
            }
            Err(e) => {
                error!(
                    error = %e,
                    "failed to reload configuration - continuing with previous configuration"
                );
                ReloadOutcome::Keep
            }
        }
    }

    /// Reload and queue the result for the loop. Returns true if a
    /// `Configure` event was sent.
    pub fn reload_into(&self, events: &mpsc::UnboundedSender<LoopEvent>, origin: ConfigOrigin) -> bool {
        match self.reload() {
            ReloadOutcome::Apply(names) => events.send(LoopEvent::Configure { names, origin }).is_ok(),
            ReloadOutcome::Keep => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keeps_order_and_duplicates() {
        assert_eq!(
            parse_config("Safari\nMail\n\nSafari\n"),
            vec!["Safari", "Mail", "Safari"]
        );
    }

    #[test]
    fn test_parse_trims_and_drops_blank_lines() {
        assert_eq!(parse_config("Safari\n\n  Mail  \n"), vec!["Safari", "Mail"]);
        assert_eq!(parse_config("\t\r\n   \n"), Vec::<String>::new());
    }

    #[test]
    fn test_parse_keeps_inner_spaces() {
        assert_eq!(parse_config("  Visual Studio Code \r\n"), vec!["Visual Studio Code"]);
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        fs::write(&path, "Safari\n\n  Mail  \n").unwrap();

        assert_eq!(load_config_file(&path).unwrap(), vec!["Safari", "Mail"]);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        assert!(matches!(
            load_config_file(&path),
            Err(ConfigError::NotFound(p)) if p == path
        ));
    }

    #[test]
    fn test_directory_is_not_regular() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            validate_path(dir.path()),
            Err(ConfigError::NotRegularFile(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_to_file_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real");
        let link = dir.path().join("config");
        fs::write(&target, "Safari\n").unwrap();
        std::os::unix::fs::symlink("real", &link).unwrap();

        assert_eq!(validate_path(&link).unwrap(), target);
        assert_eq!(load_config_file(&link).unwrap(), vec!["Safari"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_to_directory_reports_link_path() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("subdir");
        let link = dir.path().join("config");
        fs::create_dir(&target).unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert!(matches!(
            validate_path(&link),
            Err(ConfigError::NotRegularFile(p)) if p == link
        ));
    }

    #[test]
    fn test_reload_missing_default_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let reloader = ConfigReloader::new(dir.path().join("config"), true);
        assert_eq!(reloader.reload(), ReloadOutcome::Apply(Vec::new()));
    }

    #[test]
    fn test_reload_missing_explicit_keeps() {
        let dir = tempfile::tempdir().unwrap();
        let reloader = ConfigReloader::new(dir.path().join("config"), false);
        assert_eq!(reloader.reload(), ReloadOutcome::Keep);
    }

    #[test]
    fn test_reload_not_regular_keeps() {
        let dir = tempfile::tempdir().unwrap();
        let reloader = ConfigReloader::new(dir.path(), true);
        assert_eq!(reloader.reload(), ReloadOutcome::Keep);
    }

    #[test]
    fn test_reload_into_sends_only_on_apply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let reloader = ConfigReloader::new(&path, false);
        assert!(!reloader.reload_into(&tx, ConfigOrigin::Signal));
        assert!(rx.try_recv().is_err());

        fs::write(&path, "Mail\n").unwrap();
        assert!(reloader.reload_into(&tx, ConfigOrigin::Signal));
        assert_eq!(
            rx.try_recv().unwrap(),
            LoopEvent::Configure {
                names: vec!["Mail".to_string()],
                origin: ConfigOrigin::Signal,
            }
        );
    }
}
