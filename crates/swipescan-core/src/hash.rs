//! Average-hash fingerprints and Hamming-distance similarity
//!
//! Full-frame hashes drive vertical page dedup; band-restricted hashes drive
//! the horizontal carousel, where only the strip around the biometrics row
//! carries meaning and the photo behind it keeps changing.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};
use image_hasher::{HashAlg, HasherConfig, ImageHash};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Mean-hash fingerprint of a `size x size` grayscale grid.
///
/// The empty hash (no `ImageHash`) is produced for unreadable input; it never
/// compares as similar to anything, itself included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerceptualHash {
    size: u32,
    hash: Option<ImageHash>,
}

impl PerceptualHash {
    pub fn empty() -> Self {
        Self { size: 0, hash: None }
    }

    pub fn is_empty(&self) -> bool {
        self.hash.is_none()
    }

    pub fn hash_size(&self) -> u32 {
        self.size
    }

    /// Number of bits carried (`size * size`), saturating for absurd sizes.
    pub fn bit_len(&self) -> u32 {
        self.size.saturating_mul(self.size)
    }

    /// Hex rendering of the packed bits. Used in logs and the compare command.
    pub fn to_hex(&self) -> String {
        self.hash
            .as_ref()
            .map(|hash| hash.as_bytes().iter().map(|b| format!("{:02x}", b)).collect())
            .unwrap_or_default()
    }
}

/// Height of the horizontal band used by [`similar_in_roi`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BandSpec {
    /// Fraction of the smaller of the two image heights.
    Ratio(f32),
    /// Absolute height in pixels.
    Pixels(u32),
}

impl BandSpec {
    pub fn resolve(&self, image_height: u32) -> u32 {
        match *self {
            BandSpec::Ratio(ratio) => (ratio.max(0.0) * image_height as f32).round() as u32,
            BandSpec::Pixels(px) => px,
        }
    }
}

/// Average hash of an image: grayscale, area-downsample to `size x size`,
/// one bit per cell set when the cell is at or above the grid mean.
pub fn ahash(image: &DynamicImage, size: u32) -> PerceptualHash {
    if image.width() == 0 || image.height() == 0 {
        return PerceptualHash::empty();
    }
    ahash_gray(&image.to_luma8(), size)
}

/// [`ahash`] over an already grayscale buffer.
///
/// The box-filter downsample happens here so every source pixel contributes;
/// the mean threshold and bit packing are `image_hasher`'s `Mean` algorithm
/// over the resulting grid.
pub fn ahash_gray(gray: &GrayImage, size: u32) -> PerceptualHash {
    if size == 0 || gray.width() == 0 || gray.height() == 0 {
        return PerceptualHash::empty();
    }

    let cells = area_downsample(gray, size);
    let grid = GrayImage::from_fn(size, size, |x, y| {
        Luma([cells[(y * size + x) as usize].round().clamp(0.0, 255.0) as u8])
    });

    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::Mean)
        .hash_size(size, size)
        .resize_filter(FilterType::Nearest)
        .to_hasher();
    PerceptualHash {
        size,
        hash: Some(hasher.hash_image(&DynamicImage::ImageLuma8(grid))),
    }
}

/// Box-filter resample: every output cell is the mean of the source pixels it covers.
fn area_downsample(gray: &GrayImage, size: u32) -> Vec<f64> {
    let (w, h) = gray.dimensions();
    let span = |i: u32, extent: u32| -> (u32, u32) {
        let start = (i as u64 * extent as u64 / size as u64) as u32;
        let end = ((i as u64 + 1) * extent as u64 / size as u64) as u32;
        (start, end.max(start + 1).min(extent))
    };

    let mut cells = Vec::with_capacity((size as usize).pow(2));
    for cy in 0..size {
        let (y0, y1) = span(cy, h);
        for cx in 0..size {
            let (x0, x1) = span(cx, w);
            let mut sum = 0u64;
            for y in y0..y1 {
                for x in x0..x1 {
                    sum += gray.get_pixel(x, y)[0] as u64;
                }
            }
            let count = ((y1 - y0) * (x1 - x0)) as f64;
            cells.push(sum as f64 / count);
        }
    }
    cells
}

/// Bit distance. Hashes of different shape (an empty hash included) are
/// reported as completely different: the full bit length of the larger one.
pub fn hamming(a: &PerceptualHash, b: &PerceptualHash) -> u32 {
    match (&a.hash, &b.hash) {
        (Some(x), Some(y)) if a.size == b.size => x.dist(y),
        _ => a.bit_len().max(b.bit_len()),
    }
}

pub fn similar(a: &PerceptualHash, b: &PerceptualHash, threshold: u32) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    hamming(a, b) <= threshold
}

/// Crop a horizontal band of `band_px` rows centred on `y_center`.
///
/// Returns `None` when the band is degenerate: thinner than the hash grid or
/// clipped by the image edge down to fewer rows than the grid.
pub fn crop_band(image: &DynamicImage, y_center: i64, band_px: u32, size: u32) -> Option<GrayImage> {
    if band_px < size.max(1) || image.width() == 0 {
        return None;
    }
    let height = image.height() as i64;
    let top = y_center - band_px as i64 / 2;
    let y0 = top.clamp(0, height);
    let y1 = (top + band_px as i64).clamp(0, height);
    if y1 - y0 < size.max(1) as i64 {
        return None;
    }
    Some(
        image
            .crop_imm(0, y0 as u32, image.width(), (y1 - y0) as u32)
            .to_luma8(),
    )
}

/// Band-restricted similarity, falling back to whole-frame [`similar`] when
/// either crop is degenerate.
pub fn similar_in_roi(
    first: &DynamicImage,
    second: &DynamicImage,
    y_center: i64,
    band: BandSpec,
    size: u32,
    threshold: u32,
) -> bool {
    let band_px = band.resolve(first.height().min(second.height()));
    match (
        crop_band(first, y_center, band_px, size),
        crop_band(second, y_center, band_px, size),
    ) {
        (Some(a), Some(b)) => similar(&ahash_gray(&a, size), &ahash_gray(&b, size), threshold),
        _ => similar(&ahash(first, size), &ahash(second, size), threshold),
    }
}

/// Decode a frame from disk, logging instead of failing.
pub fn load_frame<P: AsRef<Path>>(path: P) -> Option<DynamicImage> {
    match image::open(path.as_ref()) {
        Ok(image) => Some(image),
        Err(e) => {
            warn!("Unreadable frame {:?}: {}", path.as_ref(), e);
            None
        }
    }
}

/// [`ahash`] of a file; an unreadable file yields the empty hash.
pub fn ahash_file<P: AsRef<Path>>(path: P, size: u32) -> PerceptualHash {
    load_frame(path)
        .map(|image| ahash(&image, size))
        .unwrap_or_else(PerceptualHash::empty)
}

pub fn similar_files<P: AsRef<Path>, Q: AsRef<Path>>(
    first: P,
    second: Q,
    size: u32,
    threshold: u32,
) -> bool {
    similar(&ahash_file(first, size), &ahash_file(second, size), threshold)
}

pub fn similar_files_in_roi<P: AsRef<Path>, Q: AsRef<Path>>(
    first: P,
    second: Q,
    y_center: i64,
    band: BandSpec,
    size: u32,
    threshold: u32,
) -> bool {
    match (load_frame(first), load_frame(second)) {
        (Some(a), Some(b)) => similar_in_roi(&a, &b, y_center, band, size, threshold),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    fn gradient(width: u32, height: u32, phase: u32) -> DynamicImage {
        let img = RgbImage::from_fn(width, height, |x, y| {
            let v = (((x + phase) * 7 + y * 3) % 256) as u8;
            Rgb([v, v / 2, 255 - v])
        });
        DynamicImage::ImageRgb8(img)
    }

    fn split_halves(width: u32, height: u32, top_dark: bool) -> DynamicImage {
        let img = GrayImage::from_fn(width, height, |_, y| {
            let dark = (y < height / 2) == top_dark;
            Luma([if dark { 20 } else { 230 }])
        });
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn test_ahash_is_deterministic() {
        let img = gradient(120, 90, 0);
        let a = ahash(&img, 8);
        let b = ahash(&img, 8);
        assert_eq!(a, b);
        assert_eq!(a.bit_len(), 64);
        assert_eq!(hamming(&a, &b), 0);
    }

    #[test]
    fn test_similarity_reflexive_and_monotonic() {
        let a = ahash(&gradient(64, 64, 0), 8);
        let b = ahash(&gradient(64, 64, 40), 8);
        for t in 0..8 {
            assert!(similar(&a, &a, t));
            if similar(&a, &b, t) {
                assert!(similar(&a, &b, t + 1));
            }
        }
    }

    #[test]
    fn test_opposite_halves_are_far_apart() {
        let a = ahash(&split_halves(40, 40, true), 8);
        let b = ahash(&split_halves(40, 40, false), 8);
        assert_eq!(hamming(&a, &b), 64);
        assert!(!similar(&a, &b, 5));
    }

    #[test]
    fn test_shape_mismatch_is_full_length() {
        let img = gradient(50, 50, 0);
        let small = ahash(&img, 8);
        let large = ahash(&img, 16);
        assert_eq!(hamming(&small, &large), 256);
        assert_eq!(hamming(&small, &PerceptualHash::empty()), 64);
        assert!(!similar(&small, &PerceptualHash::empty(), u32::MAX));
        assert!(!similar(&PerceptualHash::empty(), &PerceptualHash::empty(), u32::MAX));
    }

    #[test]
    fn test_mean_bits_follow_area_cells() {
        // Left half dark, right half bright: after the area downsample exactly
        // the right-hand cells sit at or above the grid mean.
        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(37, 23, |x, _| {
            Luma([if x < 18 { 10 } else if x == 18 { 120 } else { 240 }])
        }));
        let hash = ahash(&img, 4);
        assert_eq!(hash.bit_len(), 16);
        assert_eq!(hash.to_hex().len(), 4);
        let mirrored = ahash(&img.rotate180(), 4);
        assert_eq!(hamming(&hash, &mirrored), 16);
    }

    #[test]
    fn test_bit_len_saturates() {
        let huge = PerceptualHash {
            size: 70_000,
            hash: None,
        };
        assert_eq!(huge.bit_len(), u32::MAX);
        assert_eq!(hamming(&huge, &PerceptualHash::empty()), u32::MAX);
    }

    #[test]
    fn test_band_ignores_changes_outside_the_band() {
        let base = split_halves(100, 200, true);
        let mut changed = base.to_luma8();
        // Repaint only the top 40 rows; the band around y=150 is untouched.
        for y in 0..40 {
            for x in 0..100 {
                changed.put_pixel(x, y, Luma([(x * 2) as u8]));
            }
        }
        let changed = DynamicImage::ImageLuma8(changed);

        assert!(similar_in_roi(&base, &changed, 150, BandSpec::Pixels(30), 8, 0));
        assert!(!similar(&ahash(&base, 8), &ahash(&changed, 8), 0));
    }

    #[test]
    fn test_degenerate_band_falls_back_to_full_frame() {
        let a = gradient(80, 120, 0);
        let b = gradient(80, 120, 90);

        for threshold in [0, 5, 20, 64] {
            let full = similar(&ahash(&a, 8), &ahash(&b, 8), threshold);
            // Too thin for the grid.
            assert_eq!(similar_in_roi(&a, &b, 60, BandSpec::Pixels(4), 8, threshold), full);
            // Entirely off-screen.
            assert_eq!(similar_in_roi(&a, &b, -500, BandSpec::Ratio(0.1), 8, threshold), full);
        }
        assert!(crop_band(&a, 60, 4, 8).is_none());
        assert!(crop_band(&a, 60, 24, 8).is_some());
    }

    #[test]
    fn test_unreadable_file_never_matches() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        gradient(32, 32, 0).save(&good).unwrap();
        let missing = dir.path().join("missing.png");

        assert!(ahash_file(&missing, 8).is_empty());
        assert!(!similar_files(&good, &missing, 8, 64));
        assert!(!similar_files_in_roi(&good, &missing, 16, BandSpec::Pixels(16), 8, 64));
        assert!(similar_files(&good, &good, 8, 0));
    }
}
