//! Image saving utilities.

use std::fs;
use std::path::Path;

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use ndarray::Array4;

use crate::error::{Error, Result};

use super::{ImageTensor, RGB_CHANNELS};

/// Save a tensor as an image file.
///
/// The tensor is quantized with [`to_ubyte`] and written in the format implied
/// by the extension (PNG for the evaluator's outputs). Missing parent
/// directories are created.
///
/// # Arguments
///
/// * `tensor` - NCHW tensor with 1 or 3 channels, values in [0, 1]
/// * `path` - Output file path
///
/// # Errors
///
/// Returns an error if the tensor has an unsupported channel count or the
/// image cannot be written.
pub fn save_image<P: AsRef<Path>>(tensor: &ImageTensor, path: P) -> Result<()> {
    let path = path.as_ref();

    let img = tensor_to_image(tensor)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    img.save(path).map_err(|source| Error::ImageSave {
        path: path.to_path_buf(),
        source,
    })
}

/// Quantize a [0, 1] tensor to 8 bits: clamp, scale by 255, round half to even.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[must_use]
pub fn to_ubyte(tensor: &ImageTensor) -> Array4<u8> {
    // Safe: clamped to [0, 255] before casting
    tensor.mapv(|v| (v.clamp(0.0, 1.0) * 255.0).round_ties_even() as u8)
}

/// Convert the first image of a batch to an 8-bit image buffer.
#[allow(clippy::cast_possible_truncation)]
fn tensor_to_image(tensor: &ImageTensor) -> Result<DynamicImage> {
    let (_, channels, height, width) = tensor.dim();
    let bytes = to_ubyte(tensor);

    // Safe: dimensions came from a decoded image, which are u32
    let (w, h) = (width as u32, height as u32);

    match channels {
        RGB_CHANNELS => Ok(DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            let (x, y) = (x as usize, y as usize);
            Rgb([bytes[[0, 0, y, x]], bytes[[0, 1, y, x]], bytes[[0, 2, y, x]]])
        }))),
        1 => Ok(DynamicImage::ImageLuma8(GrayImage::from_fn(w, h, |x, y| {
            Luma([bytes[[0, 0, y as usize, x as usize]]])
        }))),
        other => Err(Error::ShapeMismatch {
            expected: "1 or 3 channels".to_string(),
            actual: format!("{other} channels"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::load_image;

    #[test]
    fn test_to_ubyte_rounds_and_clamps() {
        let tensor =
            ImageTensor::from_shape_vec((1, 1, 1, 5), vec![-0.2, 0.0, 0.5, 0.999, 1.3]).unwrap();
        let bytes = to_ubyte(&tensor);

        assert_eq!(bytes.into_raw_vec_and_offset().0, vec![0, 0, 128, 255, 255]);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_to_ubyte_rounds_half_to_even() {
        let values = [0.5_f32 / 255.0, 2.5 / 255.0, 3.5 / 255.0];
        for v in values {
            assert!((v * 255.0).fract() == 0.5);
        }

        let tensor = ImageTensor::from_shape_vec((1, 1, 1, 3), values.to_vec()).unwrap();
        assert_eq!(to_ubyte(&tensor).into_raw_vec_and_offset().0, vec![0, 2, 4]);
    }

    #[test]
    fn test_save_creates_parent_dirs_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene_1").join("frame.png");

        #[allow(clippy::cast_precision_loss)]
        let tensor = ImageTensor::from_shape_fn((1, 3, 4, 5), |(_, c, y, x)| {
            (c * 20 + y * 5 + x) as f32 / 255.0
        });
        save_image(&tensor, &path).unwrap();

        let loaded = load_image(&path).unwrap();
        assert_eq!(loaded.dim(), (1, 3, 4, 5));
        for (a, b) in loaded.iter().zip(tensor.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_rejects_multichannel_tensor() {
        let tensor = ImageTensor::zeros((1, 4, 2, 2));
        assert!(matches!(
            tensor_to_image(&tensor),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
