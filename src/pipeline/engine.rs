//! Inference engine wrapping an ONNX Runtime session.

use std::path::Path;

use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;

use crate::error::{Error, Result};
use crate::image::ImageTensor;
use crate::model::{self, Device};

/// Something that restores an NCHW image tensor.
///
/// Implementations receive stride-aligned input of shape `(1, C, H, W)` and
/// must return a tensor with the same `H` and `W`.
pub trait Restore {
    /// Run the network on one padded input.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    fn restore(&mut self, input: &ImageTensor) -> Result<ImageTensor>;
}

/// ONNX enhancement network.
pub struct Engine {
    session: Session,
}

impl Engine {
    /// Wrap an already built session.
    #[must_use]
    pub const fn new(session: Session) -> Self {
        Self { session }
    }

    /// Load the network at `path` on `device`.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be loaded.
    pub fn load(path: &Path, device: Device) -> Result<Self> {
        model::load_session(path, device).map(Self::new)
    }
}

impl Restore for Engine {
    fn restore(&mut self, input: &ImageTensor) -> Result<ImageTensor> {
        let input_value =
            Tensor::from_array(input.clone()).map_err(|source| Error::Inference { source })?;

        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(|source| Error::Inference { source })?;

        // Get first output
        let output = outputs
            .values()
            .next()
            .ok_or_else(|| Error::ShapeMismatch {
                expected: "restored image output".to_string(),
                actual: "no output".to_string(),
            })?;

        let restored = extract_array4(&output)?;

        let (_, _, h, w) = input.dim();
        let (_, _, oh, ow) = restored.dim();
        if (oh, ow) != (h, w) {
            return Err(Error::ShapeMismatch {
                expected: format!("output of {h}x{w}"),
                actual: format!("{oh}x{ow}"),
            });
        }

        Ok(restored)
    }
}

/// Extract a 4D array from an ONNX value.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn extract_array4(value: &ort::value::ValueRef<'_>) -> Result<Array4<f32>> {
    let (shape_info, data) = value
        .try_extract_tensor::<f32>()
        .map_err(|source| Error::Inference { source })?;

    // Safe: tensor dimensions are always non-negative and within bounds
    let dims: Vec<usize> = shape_info.iter().map(|&x| x as usize).collect();

    if dims.len() != 4 {
        return Err(Error::ShapeMismatch {
            expected: "4D tensor".to_string(),
            actual: format!("{}D tensor", dims.len()),
        });
    }

    Array4::from_shape_vec((dims[0], dims[1], dims[2], dims[3]), data.to_vec()).map_err(|_| {
        Error::ShapeMismatch {
            expected: format!("{dims:?}"),
            actual: "reshape failed".to_string(),
        }
    })
}
