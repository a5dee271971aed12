//! Edge-energy row fallback
//!
//! A weak last resort: the row with the most horizontal-gradient energy
//! inside a band of the screen, after smoothing the per-row profile.

use super::config::EdgeFallbackConfig;
use crate::Result;
use anyhow::Context;
use opencv::{
    core::{self, CV_16S, Mat},
    imgproc,
    prelude::*,
};

/// Normalized 1-D Gaussian of odd length `size`, sigma derived from the size.
pub fn gaussian_kernel(size: usize) -> Vec<f64> {
    let size = size.max(1) | 1;
    let sigma = 0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (size / 2) as f64;
    let weights: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - half;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Convolve with edge replication so the output length matches the input.
pub fn smooth(values: &[f64], kernel: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let half = kernel.len() as isize / 2;
    let last = values.len() as isize - 1;
    (0..values.len() as isize)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * values[(i + k as isize - half).clamp(0, last) as usize])
                .sum()
        })
        .collect()
}

/// Index of the strongest smoothed row inside `[y0, y1)`.
pub fn peak_row(row_energy: &[f64], y0: usize, y1: usize, kernel_size: usize) -> Option<usize> {
    let y1 = y1.min(row_energy.len());
    if y0 >= y1 {
        return None;
    }
    let smoothed = smooth(row_energy, &gaussian_kernel(kernel_size));
    smoothed[y0..y1]
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1).then(b.0.cmp(&a.0)))
        .filter(|&(_, value)| *value > 0.0)
        .map(|(i, _)| y0 + i)
}

/// Sum of absolute horizontal Sobel response per row
fn row_energy(gray: &Mat) -> Result<Vec<f64>> {
    let mut grad_x = Mat::default();
    imgproc::sobel(gray, &mut grad_x, CV_16S, 1, 0, 3, 1.0, 0.0, core::BORDER_DEFAULT)
        .context("Sobel failed")?;
    let mut magnitude = Mat::default();
    core::convert_scale_abs(&grad_x, &mut magnitude, 1.0, 0.0)?;

    let cols = magnitude.cols() as usize;
    let bytes = magnitude.data_bytes()?;
    Ok(bytes
        .chunks(cols.max(1))
        .map(|row| row.iter().map(|&v| v as f64).sum())
        .collect())
}

/// Row with the strongest vertical-edge energy, if any edge exists in the band.
pub fn strongest_edge_row(gray: &Mat, config: &EdgeFallbackConfig) -> Result<Option<i32>> {
    let height = gray.rows();
    if height <= 0 {
        return Ok(None);
    }
    let y0 = ((height as f64 * config.roi_top) as i32).clamp(0, height) as usize;
    let y1 = ((height as f64 * config.roi_bottom) as i32).clamp(0, height) as usize;

    let energy = row_energy(gray)?;
    Ok(peak_row(&energy, y0, y1, config.smooth_kernel).map(|y| y as i32))
}
