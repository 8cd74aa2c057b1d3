//! Reflective padding to a stride factor, and the matching crop.
//!
//! Enhancement networks downsample internally, so both spatial dimensions of
//! their input must be multiples of a fixed stride factor. Inputs are padded on
//! the bottom and right edges only, which lets the output be cropped back by
//! truncation without tracking an offset.

use ndarray::s;

use crate::error::{Error, Result};

use super::ImageTensor;

/// Amount of padding needed to bring `len` up to a multiple of `factor`.
///
/// An already aligned length gets zero padding, never a full `factor`.
///
/// # Panics
///
/// Panics if `factor` is zero.
#[must_use]
pub const fn pad_amount(len: usize, factor: usize) -> usize {
    (factor - len % factor) % factor
}

/// Smallest multiple of `factor` that is greater than or equal to `len`.
///
/// # Panics
///
/// Panics if `factor` is zero.
#[must_use]
pub const fn padded_len(len: usize, factor: usize) -> usize {
    len + pad_amount(len, factor)
}

/// Padding applied to one image, remembered so the output can be cropped back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Padding {
    /// Original height in pixels.
    pub height: usize,
    /// Original width in pixels.
    pub width: usize,
    /// Rows appended at the bottom.
    pub pad_h: usize,
    /// Columns appended on the right.
    pub pad_w: usize,
}

impl Padding {
    /// Compute the padding for an image of `height` x `width`.
    ///
    /// Reflection mirrors interior samples without repeating the edge, so a
    /// dimension can only be extended by fewer samples than it already has.
    /// Images too small for that are rejected rather than padded some other way.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for a zero factor and
    /// [`Error::UnsupportedDimensions`] when reflection is not defined.
    pub fn for_dims(height: usize, width: usize, factor: usize) -> Result<Self> {
        if factor == 0 {
            return Err(Error::InvalidParameter {
                name: "factor".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        if height == 0 || width == 0 {
            return Err(Error::UnsupportedDimensions {
                width,
                height,
                reason: "image is empty".to_string(),
            });
        }

        let pad_h = pad_amount(height, factor);
        let pad_w = pad_amount(width, factor);

        if pad_h >= height || pad_w >= width {
            return Err(Error::UnsupportedDimensions {
                width,
                height,
                reason: format!(
                    "reflective padding by {pad_h}x{pad_w} needs each dimension to exceed its padding (factor {factor})"
                ),
            });
        }

        Ok(Self {
            height,
            width,
            pad_h,
            pad_w,
        })
    }

    /// Height after padding.
    #[must_use]
    pub const fn padded_height(&self) -> usize {
        self.height + self.pad_h
    }

    /// Width after padding.
    #[must_use]
    pub const fn padded_width(&self) -> usize {
        self.width + self.pad_w
    }

    /// Whether the image was already aligned.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.pad_h == 0 && self.pad_w == 0
    }
}

/// Index into a dimension of length `len` after reflection past its end.
#[inline]
const fn reflect(index: usize, len: usize) -> usize {
    if index < len {
        index
    } else {
        2 * (len - 1) - index
    }
}

/// Reflection-pad an NCHW tensor so H and W are multiples of `factor`.
///
/// Row `H + i` of the result equals row `H - 2 - i` of the input, and likewise
/// for columns. Samples are copied unchanged.
///
/// # Errors
///
/// Returns an error if the tensor is too small to reflect, see [`Padding::for_dims`].
pub fn pad_reflect(tensor: &ImageTensor, factor: usize) -> Result<(ImageTensor, Padding)> {
    let (batch, channels, height, width) = tensor.dim();
    let padding = Padding::for_dims(height, width, factor)?;

    if padding.is_noop() {
        return Ok((tensor.clone(), padding));
    }

    let padded = ImageTensor::from_shape_fn(
        (
            batch,
            channels,
            padding.padded_height(),
            padding.padded_width(),
        ),
        |(b, c, y, x)| tensor[[b, c, reflect(y, height), reflect(x, width)]],
    );

    Ok((padded, padding))
}

/// Crop a network output back to the size recorded in `padding`.
///
/// # Errors
///
/// Returns an error if the tensor is smaller than the original image.
pub fn crop(tensor: &ImageTensor, padding: &Padding) -> Result<ImageTensor> {
    let (_, _, height, width) = tensor.dim();

    if height < padding.height || width < padding.width {
        return Err(Error::ShapeMismatch {
            expected: format!("at least {}x{}", padding.height, padding.width),
            actual: format!("{height}x{width}"),
        });
    }

    Ok(tensor
        .slice(s![.., .., ..padding.height, ..padding.width])
        .to_owned())
}

/// Clamp every sample into [0, 1].
pub fn clamp_unit(tensor: &mut ImageTensor) {
    tensor.mapv_inplace(|v| v.clamp(0.0, 1.0));
}
