//! On-disk extractor: stages each manifest for later extraction

use anyhow::{Context, Result};
use log::info;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use swipescan_core::Extractor;

/// Copies every submitted manifest into `profile_NNN/` with a `manifest.json`.
pub struct ManifestExporter {
    export_dir: PathBuf,
    submitted: usize,
}

impl ManifestExporter {
    pub fn new<P: AsRef<Path>>(export_dir: P) -> Self {
        Self {
            export_dir: export_dir.as_ref().to_path_buf(),
            submitted: 0,
        }
    }

    pub fn submitted(&self) -> usize {
        self.submitted
    }
}

impl Extractor for ManifestExporter {
    fn submit(&mut self, images: &[PathBuf], prompt: &str) -> Result<serde_json::Value> {
        self.submitted += 1;
        let dir = self.export_dir.join(format!("profile_{:03}", self.submitted));
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create export directory: {:?}", dir))?;

        let mut staged = Vec::with_capacity(images.len());
        for (i, image) in images.iter().enumerate() {
            let name = image
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "image.png".to_string());
            let target = dir.join(format!("{:02}_{}", i, name));
            fs::copy(image, &target).with_context(|| format!("Failed to copy {:?} to {:?}", image, target))?;
            staged.push(target);
        }

        let manifest = json!({
            "profile": self.submitted,
            "prompt": prompt,
            "sources": images,
            "images": staged,
        });
        let path = dir.join("manifest.json");
        fs::write(&path, serde_json::to_string_pretty(&manifest)?)
            .with_context(|| format!("Failed to write manifest: {:?}", path))?;

        info!("Staged {} image(s) in {:?}", staged.len(), dir);
        Ok(manifest)
    }
}
