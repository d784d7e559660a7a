//! Portal configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::CoreError;
use crate::Result;

/// Environment variable that replaces the platform data directory
pub const DATA_DIR_ENV: &str = "SEKOLAH_DATA_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the database file
    pub database_path: PathBuf,
    /// Directory for backup documents
    pub backup_dir: PathBuf,
    /// Populate the default dataset when the store starts empty
    pub seed_defaults: bool,
    /// Audit entries kept before the oldest are dropped
    pub audit_max_entries: usize,
}

impl Config {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            database_path: data_dir.join("sekolah.db"),
            backup_dir: data_dir.join("backups"),
            seed_defaults: true,
            audit_max_entries: sekolah_audit::DEFAULT_MAX_ENTRIES,
        }
    }

    pub fn data_dir() -> PathBuf {
        resolve_data_dir(std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
    }

    /// Load a JSON config file. Missing fields take their default values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&text).map_err(|e| {
            CoreError::Config(format!("invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;

        tracing::debug!(path = %path.display(), "Loaded config");

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(CoreError::Config("database_path is empty".to_string()));
        }
        if self.audit_max_entries == 0 {
            return Err(CoreError::Config(
                "audit_max_entries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::data_dir())
    }
}

fn resolve_data_dir(override_dir: Option<PathBuf>) -> PathBuf {
    override_dir
        .filter(|dir| !dir.as_os_str().is_empty())
        .or_else(|| dirs::data_local_dir().map(|d| d.join("SekolahPortal")))
        .unwrap_or_else(|| PathBuf::from(".sekolah"))
}

// Platform data directory lookup
mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
        }
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .filter(|d| !d.is_empty())
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_follow_data_dir() {
        let config = Config::new(PathBuf::from("/srv/sekolah"));
        assert_eq!(config.database_path, PathBuf::from("/srv/sekolah/sekolah.db"));
        assert_eq!(config.backup_dir, PathBuf::from("/srv/sekolah/backups"));
        assert!(config.seed_defaults);
        assert_eq!(config.audit_max_entries, 100);
    }

    #[test]
    fn test_data_dir_override() {
        assert_eq!(
            resolve_data_dir(Some(PathBuf::from("/tmp/portal"))),
            PathBuf::from("/tmp/portal")
        );
        assert_ne!(resolve_data_dir(Some(PathBuf::new())), PathBuf::new());
    }

    #[test]
    fn test_from_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"database_path": "/data/portal.db", "seed_defaults": false}"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/data/portal.db"));
        assert!(!config.seed_defaults);
        assert_eq!(config.audit_max_entries, 100);
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = Config::from_file(dir.path().join("absent.json"));
        assert!(matches!(missing, Err(CoreError::Config(_))));

        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Config::from_file(&path), Err(CoreError::Config(_))));

        std::fs::write(&path, r#"{"audit_max_entries": 0}"#).unwrap();
        assert!(matches!(Config::from_file(&path), Err(CoreError::Config(_))));
    }
}
