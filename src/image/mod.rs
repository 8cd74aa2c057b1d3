//! Image loading, padding, and saving utilities.

mod load;
mod pad;
mod save;

pub use load::{load_image, load_map};
pub use pad::{clamp_unit, crop, pad_amount, pad_reflect, padded_len, Padding};
pub use save::{save_image, to_ubyte};

use ndarray::Array4;

/// Image tensor in NCHW format (batch, channels, height, width).
/// Values are in the [0, 1] range.
pub type ImageTensor = Array4<f32>;

/// Number of channels in RGB images.
pub const RGB_CHANNELS: usize = 3;

/// Stride factor the enhancement networks require of both spatial dimensions.
pub const DEFAULT_FACTOR: usize = 16;
