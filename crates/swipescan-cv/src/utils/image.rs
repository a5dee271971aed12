//! Image loading and conversion between the `image` crate and OpenCV

use crate::Result;
use anyhow::{Context, ensure};
use image::GrayImage;
use log::debug;
use opencv::{
    core::{self, CV_8UC1, Mat, Scalar},
    imgcodecs,
    prelude::*,
};
use opencv_match::prelude::*;
use std::path::Path;

/// Image utility functions leveraging opencv-match conversions
pub struct ImageUtils;

impl ImageUtils {
    /// Copy an 8-bit grayscale image into a single-channel Mat
    pub fn gray_to_mat(gray: &GrayImage) -> Result<Mat> {
        let (width, height) = gray.dimensions();
        ensure!(width > 0 && height > 0, "Empty image");

        let mut mat = Mat::new_rows_cols_with_default(height as i32, width as i32, CV_8UC1, Scalar::all(0.0))?;
        mat.data_bytes_mut()?.copy_from_slice(gray.as_raw());
        Ok(mat)
    }

    /// Load image as a single-channel grayscale Mat
    pub fn load_grayscale<P: AsRef<Path>>(path: P) -> Result<Mat> {
        let gray = image::open(&path)
            .with_context(|| format!("Failed to open image: {:?}", path.as_ref()))?
            .to_luma8();
        Self::gray_to_mat(&gray)
    }

    /// Grayscale template plus its alpha channel when the asset has one
    pub fn load_template_parts<P: AsRef<Path>>(path: P) -> Result<(Mat, Option<Mat>)> {
        let image = image::open(&path)
            .with_context(|| format!("Failed to open template: {:?}", path.as_ref()))?;

        let gray = Self::gray_to_mat(&image.to_luma8())?;
        let mask = if image.color().has_alpha() {
            let rgba = image.to_rgba8();
            let alpha = GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
                image::Luma([rgba.get_pixel(x, y)[3]])
            });
            debug!("Template {:?} carries an alpha mask", path.as_ref());
            Some(Self::gray_to_mat(&alpha)?)
        } else {
            None
        };
        Ok((gray, mask))
    }

    /// Load image as color Mat using opencv-match
    pub fn load_color<P: AsRef<Path>>(path: P) -> Result<Mat> {
        let img = image::open(&path)
            .with_context(|| format!("Failed to open image: {:?}", path.as_ref()))?
            .to_rgb8();

        img.try_into_cv()
            .context("Failed to convert image to OpenCV Mat")
    }

    /// Save Mat as image
    pub fn save_image<P: AsRef<Path>>(mat: &Mat, path: P) -> Result<()> {
        let path_str = path.as_ref().to_string_lossy();

        imgcodecs::imwrite(&path_str, mat, &core::Vector::new())
            .with_context(|| format!("Failed to save image: {}", path_str))?;

        Ok(())
    }

    /// Convert OpenCV Mat to image::RgbImage using opencv-match
    pub fn mat_to_rgb(mat: &Mat) -> Result<image::RgbImage> {
        mat.try_into_cv()
            .context("Failed to convert OpenCV Mat to RGB image")
    }

    /// Write an annotated Mat, preferring the image crate encoder.
    pub fn save_overlay<P: AsRef<Path>>(mat: &Mat, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        match Self::mat_to_rgb(mat) {
            Ok(rgb_image) => rgb_image
                .save(path)
                .with_context(|| format!("Failed to save overlay: {:?}", path)),
            Err(_) => Self::save_image(mat, path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gray_round_trip_preserves_pixels() -> Result<()> {
        let gray = GrayImage::from_fn(7, 5, |x, y| image::Luma([(x * 10 + y) as u8]));
        let mat = ImageUtils::gray_to_mat(&gray)?;

        assert_eq!((mat.cols(), mat.rows()), (7, 5));
        assert_eq!(*mat.at_2d::<u8>(4, 6)?, 64);
        Ok(())
    }

    #[test]
    fn test_overlay_is_written() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("debug/overlay.png");
        let color = ImageUtils::load_color({
            let src = dir.path().join("src.png");
            image::RgbImage::new(20, 10).save(&src)?;
            src
        })?;

        ImageUtils::save_overlay(&color, &path)?;
        assert_eq!(image::image_dimensions(&path)?, (20, 10));
        Ok(())
    }
}
