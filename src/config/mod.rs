//! Configuration loading for the palace.

use std::path::{Path, PathBuf};

use anyhow::Context;
use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;

use crate::backup::DEFAULT_INTERVAL_MINUTES;
use crate::history::DEFAULT_MAX_DEPTH;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "PALACE_CONFIG";

/// Top-level configuration loaded from config.toml.
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub backup: BackupConfig,
}

/// Where the palace keeps its documents.
#[derive(Debug, Deserialize)]
pub struct DataConfig {
    /// Data root; `~/` is expanded. Defaults to the platform data directory.
    pub dir: Option<String>,
}

/// Undo history settings.
#[derive(Debug, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

/// Backup settings.
#[derive(Debug, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    /// Start periodic backups when the shell opens.
    #[serde(default)]
    pub auto: bool,
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_interval_minutes() -> u64 {
    DEFAULT_INTERVAL_MINUTES
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            history: HistoryConfig::default(),
            backup: BackupConfig::default(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { dir: None }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            auto: false,
        }
    }
}

impl Config {
    /// Load config from [`Config::config_path`], or return defaults if there is no file.
    pub fn load() -> anyhow::Result<Self> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            return Self::load_from(&path);
        }

        Ok(Config::default())
    }

    /// Load config from a specific file.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// `$PALACE_CONFIG` if set, else `config.toml` in the platform config dir.
    pub fn config_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        ProjectDirs::from("", "", "hanzi-palace").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Resolve the data root: the configured directory, else the platform data dir.
    pub fn data_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(dir) = &self.data.dir {
            return Ok(expand_tilde(dir));
        }

        ProjectDirs::from("", "", "hanzi-palace")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .context("no home directory found; set data.dir in config.toml or pass --data-dir")
    }
}

/// Expand ~ to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(base_dirs) = BaseDirs::new()
    {
        return base_dirs.home_dir().join(rest);
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.history.max_depth, 20);
        assert_eq!(config.backup.interval_minutes, 5);
        assert!(!config.backup.auto);
        assert!(config.data.dir.is_none());
    }

    #[test]
    fn sections_override_defaults() {
        let config: Config = toml::from_str(
            "[data]\ndir = \"/tmp/palace\"\n[history]\nmax_depth = 50\n[backup]\nauto = true\n",
        )
        .unwrap();

        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/palace"));
        assert_eq!(config.history.max_depth, 50);
        assert!(config.backup.auto);
        assert_eq!(config.backup.interval_minutes, 5);
    }

    #[test]
    fn load_from_reports_bad_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[history\nmax_depth = ").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("parsing config"));
    }

    #[test]
    fn tilde_is_expanded() {
        let expanded = expand_tilde("~/palace");
        assert!(expanded.ends_with("palace"));
        assert_eq!(expand_tilde("/abs/palace"), PathBuf::from("/abs/palace"));
    }
}
