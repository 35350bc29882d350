use crate::paths::AppPaths;
use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_DEVICE_HINTS: &[&str] = &["shokz", "swim", "openswim"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Folder the MP3s are written to.
    pub output_dir: Option<PathBuf>,
    /// Folder on the removable device that files are copied into.
    pub device_dir: Option<PathBuf>,
    /// Overrides the platform mount root scanned for devices.
    pub mount_root: Option<PathBuf>,
    /// Case-insensitive substrings that mark a volume as a likely match.
    pub device_hints: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: None,
            device_dir: None,
            mount_root: None,
            device_hints: DEFAULT_DEVICE_HINTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub fn load_settings(paths: &AppPaths) -> Result<Settings> {
    let path = paths.settings_path();
    if !path.exists() {
        return Ok(Settings::default());
    }
    let bytes = std::fs::read(&path)?;
    let parsed: Settings = serde_json::from_slice(&bytes).map_err(|e| {
        EngineError::Validation(format!(
            "failed to parse settings at {}: {e}",
            path.to_string_lossy()
        ))
    })?;
    Ok(parsed)
}

pub fn save_settings(paths: &AppPaths, settings: &Settings) -> Result<()> {
    let path = paths.settings_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(&path, format!("{json}\n"))?;
    Ok(())
}
