use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CatalogError, Result};

pub const CONFIG_FILE: &str = "config.json";

/// Catalog-wide settings, persisted as JSON next to the per-root state
/// directories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    /// Parent directory holding one state subdirectory per watched root.
    pub metadata_dir: PathBuf,
    /// When set, freshly synthesized annotation records are scored through
    /// the external aesthetic scorer.
    pub scoring_enabled: bool,
    /// Extraction worker count override; `None` sizes from the host CPUs.
    pub worker_threads: Option<usize>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            metadata_dir: PathBuf::from("metadata"),
            scoring_enabled: false,
            worker_threads: None,
        }
    }
}

impl CatalogConfig {
    /// Reads the config from `path`, falling back to defaults when the file
    /// is missing or unreadable. A bad config never blocks startup.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return CatalogConfig::default(),
        };

        serde_json::from_str(&content).unwrap_or_else(|error| {
            log::warn!("ignoring malformed config {}: {}", path.display(), error);
            CatalogConfig::default()
        })
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        let payload = serde_json::to_string_pretty(self).map_err(|e| CatalogError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::other(e),
        })?;
        std::fs::write(path, payload).map_err(|e| CatalogError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::test_support::unique_temp_dir;
    use std::fs;

    #[test]
    fn test_missing_config_falls_back_to_defaults() {
        let dir = unique_temp_dir("config_missing");
        let config = CatalogConfig::load(&dir.join(CONFIG_FILE));
        assert_eq!(config, CatalogConfig::default());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_config_round_trip() {
        let dir = unique_temp_dir("config_rt");
        let path = dir.join(CONFIG_FILE);
        let config = CatalogConfig {
            metadata_dir: PathBuf::from("/var/promptview"),
            scoring_enabled: true,
            worker_threads: Some(6),
        };

        config.persist(&path).unwrap();
        assert_eq!(CatalogConfig::load(&path), config);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_malformed_config_is_ignored() {
        let dir = unique_temp_dir("config_bad");
        let path = dir.join(CONFIG_FILE);
        fs::write(&path, "{not json").unwrap();
        assert_eq!(CatalogConfig::load(&path), CatalogConfig::default());
        let _ = fs::remove_dir_all(dir);
    }
}
