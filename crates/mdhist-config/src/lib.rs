use mdhist_core::{CompressionMode, RetentionPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory under a workspace holding its config and local history
pub const WORKSPACE_DIR: &str = ".mdhist";

/// Configuration for mdhist
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub history: HistoryConfig,
}

/// When automatic snapshots are taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HistoryMode {
    #[default]
    OnSave,
    Interval,
}

/// Where the history root lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageLocation {
    #[default]
    Workspace,
    GlobalStorage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub mode: HistoryMode,

    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    #[serde(default = "default_max_snapshots")]
    pub max_snapshots_per_file: usize,

    #[serde(default = "default_max_storage_mb")]
    pub max_total_storage_mb: u64,

    #[serde(default = "default_retention_days")]
    pub retention_days: u64,

    #[serde(default = "default_true")]
    pub protect_manual_checkpoints: bool,

    #[serde(default)]
    pub snapshot_compression: CompressionMode,

    #[serde(default = "default_true")]
    pub create_pre_restore_snapshot: bool,

    #[serde(default)]
    pub storage_location: StorageLocation,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: HistoryMode::default(),
            interval_minutes: default_interval_minutes(),
            max_snapshots_per_file: default_max_snapshots(),
            max_total_storage_mb: default_max_storage_mb(),
            retention_days: default_retention_days(),
            protect_manual_checkpoints: true,
            snapshot_compression: CompressionMode::default(),
            create_pre_restore_snapshot: true,
            storage_location: StorageLocation::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_interval_minutes() -> u64 {
    10
}

fn default_max_snapshots() -> usize {
    100
}

fn default_max_storage_mb() -> u64 {
    200
}

fn default_retention_days() -> u64 {
    30
}

impl HistoryConfig {
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_snapshots_per_file: self.max_snapshots_per_file,
            max_total_storage_mb: self.max_total_storage_mb,
            retention_days: self.retention_days,
            protect_manual_checkpoints: self.protect_manual_checkpoints,
        }
    }

    /// Quiet period of the interval trigger, never below one minute
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.max(1) * 60)
    }

    /// Resolve the history root for a workspace
    pub fn history_root(&self, workspace: &Path) -> anyhow::Result<PathBuf> {
        match self.storage_location {
            StorageLocation::Workspace => Ok(workspace.join(WORKSPACE_DIR).join("history")),
            StorageLocation::GlobalStorage => {
                let dirs = project_dirs()
                    .ok_or_else(|| anyhow::anyhow!("No data directory available"))?;
                Ok(dirs
                    .data_dir()
                    .join("history")
                    .join(workspace_storage_name(workspace)))
            }
        }
    }
}

/// `{name}-{8 hex}`: readable, and distinct for workspaces sharing a name
fn workspace_storage_name(workspace: &Path) -> String {
    let name = workspace
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("workspace");
    let digest = blake3::hash(workspace.to_string_lossy().as_bytes()).to_hex();
    format!("{}-{}", name, &digest[..8])
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "mdhist", "mdhist")
}

impl Config {
    /// Load config from default location or create default if not found
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path();

        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = Config::default();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let content = toml::to_string_pretty(&config)?;
            std::fs::write(&path, content)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Workspace config when the workspace has one, user config otherwise
    pub fn load_for_workspace(workspace: &Path) -> anyhow::Result<Self> {
        let local = Self::workspace_config_path(workspace);
        if local.exists() {
            Self::load_from(&local)
        } else {
            Self::load()
        }
    }

    pub fn workspace_config_path(workspace: &Path) -> PathBuf {
        workspace.join(WORKSPACE_DIR).join("config.toml")
    }

    /// Get config file path
    pub fn config_path() -> PathBuf {
        if let Some(dirs) = project_dirs() {
            dirs.config_dir().join("config.toml")
        } else {
            PathBuf::from("~/.mdhist/config.toml")
        }
    }
}
