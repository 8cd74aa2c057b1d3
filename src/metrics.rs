//! Image quality metrics.
//!
//! PSNR is measured on [0, 1] floats. SSIM is measured on 8-bit quantized
//! images with an 11x11 Gaussian window (sigma 1.5) and valid filtering, per
//! channel, then averaged.

use ndarray::{Array2, ArrayView2, Axis};

use crate::error::{Error, Result};
use crate::image::ImageTensor;

/// PSNR reported for identical images, where the ratio is unbounded.
pub const PSNR_IDENTICAL: f64 = 100.0;

const SSIM_WINDOW: usize = 11;
const SSIM_SIGMA: f64 = 1.5;
const SSIM_C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
const SSIM_C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);

/// Peak signal-to-noise ratio of two [0, 1] images, in dB.
///
/// # Errors
///
/// Returns an error if the shapes differ.
pub fn psnr(target: &ImageTensor, restored: &ImageTensor) -> Result<f64> {
    ensure_same_shape(target.shape(), restored.shape())?;

    let count = target.len().max(1);
    let sum: f64 = target
        .iter()
        .zip(restored.iter())
        .map(|(&a, &b)| {
            let d = f64::from(a) - f64::from(b);
            d * d
        })
        .sum();

    #[allow(clippy::cast_precision_loss)]
    let mse = sum / count as f64;

    if mse == 0.0 {
        return Ok(PSNR_IDENTICAL);
    }

    Ok(10.0 * (1.0 / mse).log10())
}

/// Structural similarity of two 8-bit NCHW images, averaged over channels.
///
/// # Errors
///
/// Returns an error if the shapes differ or an image is smaller than the window.
pub fn ssim(target: &ndarray::Array4<u8>, restored: &ndarray::Array4<u8>) -> Result<f64> {
    ensure_same_shape(target.shape(), restored.shape())?;

    let (_, channels, height, width) = target.dim();
    if height < SSIM_WINDOW || width < SSIM_WINDOW {
        return Err(Error::UnsupportedDimensions {
            width,
            height,
            reason: format!("SSIM needs at least {SSIM_WINDOW}x{SSIM_WINDOW} pixels"),
        });
    }

    let kernel = gaussian_kernel();
    let target = target.index_axis(Axis(0), 0);
    let restored = restored.index_axis(Axis(0), 0);

    let total: f64 = (0..channels)
        .map(|c| {
            let a = target.index_axis(Axis(0), c).mapv(f64::from);
            let b = restored.index_axis(Axis(0), c).mapv(f64::from);
            ssim_plane(a.view(), b.view(), &kernel)
        })
        .sum();

    #[allow(clippy::cast_precision_loss)]
    let channels = channels.max(1) as f64;
    Ok(total / channels)
}

fn ensure_same_shape(a: &[usize], b: &[usize]) -> Result<()> {
    if a != b {
        return Err(Error::ShapeMismatch {
            expected: format!("{a:?}"),
            actual: format!("{b:?}"),
        });
    }
    Ok(())
}

/// Normalized 1-D Gaussian kernel, applied separably.
#[allow(clippy::cast_precision_loss)]
fn gaussian_kernel() -> [f64; SSIM_WINDOW] {
    let center = (SSIM_WINDOW / 2) as f64;
    let mut kernel = [0.0; SSIM_WINDOW];
    for (i, k) in kernel.iter_mut().enumerate() {
        let x = i as f64 - center;
        *k = (-(x * x) / (2.0 * SSIM_SIGMA * SSIM_SIGMA)).exp();
    }
    let sum: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}

/// Filter with the separable kernel, keeping only fully covered positions.
fn filter_valid(img: ArrayView2<'_, f64>, kernel: &[f64; SSIM_WINDOW]) -> Array2<f64> {
    let (height, width) = img.dim();
    let (out_h, out_w) = (height + 1 - SSIM_WINDOW, width + 1 - SSIM_WINDOW);

    let rows = Array2::from_shape_fn((height, out_w), |(y, x)| {
        kernel
            .iter()
            .enumerate()
            .map(|(k, w)| w * img[[y, x + k]])
            .sum::<f64>()
    });

    Array2::from_shape_fn((out_h, out_w), |(y, x)| {
        kernel
            .iter()
            .enumerate()
            .map(|(k, w)| w * rows[[y + k, x]])
            .sum::<f64>()
    })
}

fn ssim_plane(a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>, kernel: &[f64; SSIM_WINDOW]) -> f64 {
    let mu_a = filter_valid(a, kernel);
    let mu_b = filter_valid(b, kernel);
    let aa = filter_valid((&a * &a).view(), kernel);
    let bb = filter_valid((&b * &b).view(), kernel);
    let ab = filter_valid((&a * &b).view(), kernel);

    let mut sum = 0.0;
    for ((((&ma, &mb), &saa), &sbb), &sab) in mu_a
        .iter()
        .zip(mu_b.iter())
        .zip(aa.iter())
        .zip(bb.iter())
        .zip(ab.iter())
    {
        let var_a = saa - ma * ma;
        let var_b = sbb - mb * mb;
        let cov = sab - ma * mb;
        sum += ((2.0 * ma * mb + SSIM_C1) * (2.0 * cov + SSIM_C2))
            / ((ma * ma + mb * mb + SSIM_C1) * (var_a + var_b + SSIM_C2));
    }

    #[allow(clippy::cast_precision_loss)]
    let count = mu_a.len() as f64;
    sum / count
}

/// Running collection of per-image scores.
#[derive(Debug, Clone, Default)]
pub struct Scores {
    psnr: Vec<f64>,
    ssim: Vec<f64>,
}

impl Scores {
    /// Record the scores of one image.
    pub fn push(&mut self, psnr: f64, ssim: f64) {
        self.psnr.push(psnr);
        self.ssim.push(ssim);
    }

    /// Number of images scored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.psnr.len()
    }

    /// Whether no image has been scored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.psnr.is_empty()
    }

    /// Mean PSNR, `None` when empty.
    #[must_use]
    pub fn mean_psnr(&self) -> Option<f64> {
        mean(&self.psnr)
    }

    /// Mean SSIM, `None` when empty.
    #[must_use]
    pub fn mean_ssim(&self) -> Option<f64> {
        mean(&self.ssim)
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
