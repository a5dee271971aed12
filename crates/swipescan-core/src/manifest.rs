//! Ordered image list handed to the extraction collaborator

use crate::error::ScanError;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// `[top_screenshot?, stitched_carousel?, unique_vertical_pages...]`, never
/// longer than its cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageManifest {
    images: Vec<PathBuf>,
    cap: usize,
}

impl ImageManifest {
    /// Build from an ordered list, failing instead of truncating when the cap is exceeded.
    pub fn from_paths(images: Vec<PathBuf>, cap: usize) -> Result<Self, ScanError> {
        if images.len() > cap {
            return Err(ScanError::ManifestCapExceeded {
                actual: images.len(),
                cap,
            });
        }
        Ok(Self { images, cap })
    }

    /// Assemble in manifest order: top screenshot, stitched carousel, vertical pages.
    pub fn assemble(
        top: Option<&Path>,
        carousel: Option<&Path>,
        pages: &[PathBuf],
        cap: usize,
    ) -> Result<Self, ScanError> {
        let images = top
            .into_iter()
            .chain(carousel)
            .map(Path::to_path_buf)
            .chain(pages.iter().cloned())
            .collect();
        Self::from_paths(images, cap)
    }

    pub fn images(&self) -> &[PathBuf] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("page_{i}.png"))).collect()
    }

    #[test]
    fn test_exactly_cap_succeeds() {
        let manifest = ImageManifest::from_paths(paths(4), 4).unwrap();
        assert_eq!(manifest.len(), 4);
        assert_eq!(manifest.cap(), 4);
    }

    #[test]
    fn test_cap_plus_one_is_fatal() {
        let err = ImageManifest::from_paths(paths(5), 4).unwrap_err();
        assert!(matches!(err, ScanError::ManifestCapExceeded { actual: 5, cap: 4 }));
        assert!(err.aborts_run());
        assert!(err.to_string().contains("5 images"));
    }

    #[test]
    fn test_assemble_order() {
        let top = PathBuf::from("top.png");
        let carousel = PathBuf::from("carousel.png");
        let manifest = ImageManifest::assemble(Some(&top), Some(&carousel), &paths(2), 10).unwrap();
        assert_eq!(
            manifest.images(),
            &[top, carousel, PathBuf::from("page_0.png"), PathBuf::from("page_1.png")]
        );

        let without_top = ImageManifest::assemble(None, None, &paths(2), 10).unwrap();
        assert_eq!(without_top.len(), 2);
    }
}
