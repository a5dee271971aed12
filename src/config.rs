//! Application configuration file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use swipescan_core::ScanConfig;
use swipescan_cv::RowDetectionConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scan: ScanConfig,
    pub row: RowDetectionConfig,
    pub device: DeviceConfig,
    pub session: SessionConfig,
}

/// How to reach the phone
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub adb_path: PathBuf,
    /// `adb -s` target; the only attached device when absent.
    pub serial: Option<String>,
    /// Where raw screenshots land.
    pub images_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_profiles: usize,
    /// Skip button position as fractions of the screen size.
    pub dislike_tap: (f32, f32),
    pub export_dir: PathBuf,
    /// Passed verbatim to the extractor.
    pub prompt: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            adb_path: "adb".into(),
            serial: None,
            images_dir: "images".into(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_profiles: 10,
            dislike_tap: (0.15, 0.85),
            export_dir: "submitted".into(),
            prompt: "Extract the profile fields from these screenshots in order.".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from JSON; missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).with_context(|| format!("Failed to read config: {:?}", path))?;
        serde_json::from_str(&text).with_context(|| format!("Invalid config: {:?}", path))
    }

    /// Load `path` when given, otherwise the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write config: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "session": { "max_profiles": 3 }, "scan": { "manifest": { "max_images": 6 } } }"#)?;

        let config = AppConfig::load(&path)?;
        assert_eq!(config.session.max_profiles, 3);
        assert_eq!(config.session.dislike_tap, (0.15, 0.85));
        assert_eq!(config.scan.manifest.max_images, 6);
        assert_eq!(config.scan.sweep.hamming_threshold, 5);
        assert_eq!(config.scan.carousel.hamming_threshold, 1);
        assert_eq!(config.row.templates.len(), 3);
        Ok(())
    }

    #[test]
    fn test_saved_defaults_load_back() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested/config.json");
        AppConfig::default().save(&path)?;

        let config = AppConfig::load(&path)?;
        assert_eq!(config.device.adb_path, PathBuf::from("adb"));
        assert_eq!(config.scan.pages.max_vertical_pages, 6);
        Ok(())
    }
}
