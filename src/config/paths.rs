//! Platform-specific locations for the settings file.

use std::path::PathBuf;

/// Resolved application paths.
///
/// The config file lives in the user config directory
/// (`~/.config/voxtyper/config.toml` on Linux); the current directory is the
/// fallback when the platform directory cannot be resolved.
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
}

impl ConfigPaths {
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voxtyper");
        let config_file = config_dir.join("config.toml");
        Self {
            config_dir,
            config_file,
        }
    }
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::new()
    }
}
