//! Image loading utilities.

use std::path::Path;

use image::{DynamicImage, GrayImage, RgbImage};

use crate::error::{Error, Result};

use super::{ImageTensor, RGB_CHANNELS};

/// Load an image from disk as a normalized RGB tensor.
///
/// The image is converted to RGB if necessary, scaled from [0, 255] to
/// [0, 1] and returned as an NCHW tensor `(1, 3, H, W)` at its native size.
///
/// # Errors
///
/// Returns an error if the image cannot be loaded.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<ImageTensor> {
    let img = open(path.as_ref())?;
    Ok(rgb_to_tensor(&img.to_rgb8()))
}

/// Load a side-channel map (semantic or illumination) as a single-channel tensor.
///
/// Color inputs are reduced to luma. The result is `(1, 1, H, W)` in [0, 1].
///
/// # Errors
///
/// Returns an error if the image cannot be loaded.
pub fn load_map<P: AsRef<Path>>(path: P) -> Result<ImageTensor> {
    let img = open(path.as_ref())?;
    Ok(gray_to_tensor(&img.to_luma8()))
}

fn open(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|source| Error::ImageLoad {
        path: path.to_path_buf(),
        source,
    })
}

/// Convert an RGB buffer to a normalized NCHW tensor.
fn rgb_to_tensor(rgb: &RgbImage) -> ImageTensor {
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    let mut tensor = ImageTensor::zeros((1, RGB_CHANNELS, height, width));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..RGB_CHANNELS {
            tensor[[0, c, y, x]] = f32::from(pixel[c]) / 255.0;
        }
    }

    tensor
}

fn gray_to_tensor(gray: &GrayImage) -> ImageTensor {
    let (width, height) = (gray.width() as usize, gray.height() as usize);
    let mut tensor = ImageTensor::zeros((1, 1, height, width));

    for (x, y, pixel) in gray.enumerate_pixels() {
        tensor[[0, 0, y as usize, x as usize]] = f32::from(pixel[0]) / 255.0;
    }

    tensor
}
