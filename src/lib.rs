//! # `lowlight-eval`
//!
//! Evaluate pretrained low-light image enhancement networks (MIRNet-v2,
//! RetinexFormer and relatives, exported to ONNX) on paired datasets.
//!
//! Each input is reflection-padded to the network's stride factor, restored,
//! cropped back, clamped to [0, 1], scored against ground truth with PSNR and
//! SSIM, and written out as PNG.
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use lowlight_eval::dataset::{Dataset, DatasetKind};
//! use lowlight_eval::model::Device;
//! use lowlight_eval::options::Options;
//! use lowlight_eval::{EvalConfig, Evaluator};
//!
//! # fn main() -> lowlight_eval::Result<()> {
//! let options = Options::from_file("Options/RetinexFormer_LOL_v1.yml")?;
//! let dataset = Dataset::open(DatasetKind::Custom("LOL_v1".into()), &options.datasets.val)?;
//!
//! let mut evaluator = Evaluator::new(
//!     EvalConfig::default(),
//!     Path::new("pretrained_weights/LOL_v1.onnx"),
//!     Device::Cuda(0),
//! )?;
//! let summary = evaluator.evaluate(&dataset)?;
//! println!("PSNR {:.2} SSIM {:.4}", summary.psnr, summary.ssim);
//! # Ok(())
//! # }
//! ```

pub mod dataset;
pub mod error;
pub mod image;
pub mod metrics;
pub mod model;
pub mod options;
pub mod pipeline;

pub use error::{Error, Result};
pub use pipeline::{EvalConfig, Evaluator, Summary};
