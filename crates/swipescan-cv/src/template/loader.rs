//! Icon asset loading
//!
//! Icons live under an asset directory as `icon_<name>.png`. A calibrated
//! crop at `calibrated/<name>_cal.png` takes precedence when present.

use super::Template;
use crate::Result;
use crate::utils::image::ImageUtils;
use anyhow::Context;
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

pub struct TemplateLoader {
    asset_dirs: Vec<PathBuf>,
    supported_extensions: Vec<String>,
}

impl TemplateLoader {
    pub fn new() -> Self {
        Self {
            asset_dirs: Vec::new(),
            supported_extensions: vec!["png".to_string(), "jpg".to_string(), "jpeg".to_string()],
        }
    }

    pub fn add_asset_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.asset_dirs.push(dir.as_ref().to_path_buf());
        self
    }

    /// Load one icon by name, calibrated variant first.
    ///
    /// `Ok(None)` when no asset exists; an asset that exists but cannot be
    /// decoded is an error.
    pub fn load_icon(&self, name: &str) -> Result<Option<Template>> {
        if let Some(path) = self.find_calibrated(name) {
            debug!("Using calibrated template for {}: {:?}", name, path);
            return Self::load_path(name, &path).map(Some);
        }

        for candidate in self.generate_candidates(name) {
            if let Some(path) = self.find_file(&candidate) {
                return Self::load_path(name, &path).map(Some);
            }
        }

        warn!("No template asset for '{}' in {:?}", name, self.asset_dirs);
        Ok(None)
    }

    /// Load a template straight from a file.
    pub fn load_path(name: &str, path: &Path) -> Result<Template> {
        let (image, mask) = ImageUtils::load_template_parts(path)
            .with_context(|| format!("Failed to load template: {:?}", path))?;
        Ok(Template::new(name, image)
            .with_mask(mask)
            .with_path(path.to_path_buf()))
    }

    /// Every named icon that could be found, in input order.
    pub fn load_icons(&self, names: &[String]) -> Vec<(String, Option<Template>)> {
        names
            .iter()
            .map(|name| {
                let template = self.load_icon(name).unwrap_or_else(|e| {
                    warn!("Template '{}' unusable: {:#}", name, e);
                    None
                });
                (name.clone(), template)
            })
            .collect()
    }

    fn find_calibrated(&self, name: &str) -> Option<PathBuf> {
        self.asset_dirs
            .iter()
            .map(|dir| dir.join("calibrated").join(format!("{}_cal.png", name)))
            .find(|path| path.is_file())
    }

    fn generate_candidates(&self, name: &str) -> Vec<String> {
        let mut candidates = Vec::new();

        for ext in &self.supported_extensions {
            candidates.push(format!("icon_{}.{}", name, ext));
            candidates.push(format!("icon_{}.{}", name.to_lowercase(), ext));
            candidates.push(format!("{}.{}", name, ext));
        }

        candidates
    }

    fn find_file(&self, candidate: &str) -> Option<PathBuf> {
        for dir in &self.asset_dirs {
            let path = dir.join(candidate);
            if path.is_file() {
                return Some(path);
            }

            // Case-insensitive search
            if let Ok(entries) = fs::read_dir(dir) {
                for entry in entries.flatten() {
                    let file_name = entry.file_name();
                    if file_name.to_string_lossy().to_lowercase() == candidate.to_lowercase() {
                        return Some(entry.path());
                    }
                }
            }
        }

        None
    }
}

impl Default for TemplateLoader {
    fn default() -> Self {
        Self::new()
    }
}
