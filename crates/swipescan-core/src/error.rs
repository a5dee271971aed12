//! Fatal scan conditions
//!
//! Expected negative outcomes (template not found, row disagreement, stable
//! content) are ordinary return values. Only the two policy conditions below
//! and device failures surface as errors.

use crate::sweep::SweepEnd;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    /// Fatal for the profile: no row coordinate, nothing to stitch.
    #[error("biometrics row not found after scanning {pages_scanned} page(s) ({end})")]
    RowNotFound { pages_scanned: usize, end: SweepEnd },

    /// Fatal for the run: the manifest is never truncated silently.
    #[error("image manifest holds {actual} images, exceeding the configured cap of {cap}")]
    ManifestCapExceeded { actual: usize, cap: usize },

    #[error(transparent)]
    Device(#[from] anyhow::Error),
}

impl ScanError {
    /// Whether the whole run must stop rather than just this profile.
    pub fn aborts_run(&self) -> bool {
        match self {
            ScanError::RowNotFound { .. } => false,
            ScanError::ManifestCapExceeded { .. } | ScanError::Device(_) => true,
        }
    }
}
