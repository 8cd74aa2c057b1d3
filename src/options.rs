//! Option file parsing.
//!
//! Option files are the YAML documents the enhancement models were trained
//! with. Only the keys needed at test time are read; everything else in the
//! document is ignored.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// The subset of a training option file used for evaluation.
#[derive(Debug, Clone, Deserialize)]
pub struct Options {
    /// Experiment name.
    #[serde(default)]
    pub name: Option<String>,

    /// Generator network description.
    #[serde(default)]
    pub network_g: Option<NetworkOptions>,

    /// Dataset splits.
    pub datasets: DatasetsOptions,
}

/// Network section of an option file.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkOptions {
    /// Architecture name, e.g. `RetinexFormer` or `MIRNet_v2`.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Dataset section of an option file. Only the validation split is used.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetsOptions {
    /// Validation split, the one evaluated.
    pub val: SplitOptions,
}

/// Locations of one split.
#[derive(Debug, Clone, Deserialize)]
pub struct SplitOptions {
    /// Low-quality inputs.
    pub dataroot_lq: PathBuf,

    /// Ground truth.
    pub dataroot_gt: PathBuf,

    /// Side-channel maps, for datasets that concatenate one to the input.
    #[serde(default)]
    pub dataroot_semantic: Option<PathBuf>,

    /// Upscaling factor of the split; enhancement datasets use 1.
    #[serde(default = "default_scale")]
    pub scale: u32,
}

const fn default_scale() -> u32 {
    1
}

impl Options {
    /// Read and parse an option file, expanding `~` in every data root.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid option file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let text = fs::read_to_string(path).map_err(|source| Error::Options {
            path: path.to_path_buf(),
            reason: source.to_string(),
        })?;

        Self::from_yaml(&text).map_err(|err| match err {
            Error::Options { reason, .. } => Error::Options {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse an option document from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a valid option file.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let mut options: Self = serde_yaml::from_str(text).map_err(|source| Error::Options {
            path: PathBuf::new(),
            reason: source.to_string(),
        })?;

        let val = &mut options.datasets.val;
        val.dataroot_lq = expand_home(&val.dataroot_lq);
        val.dataroot_gt = expand_home(&val.dataroot_gt);
        val.dataroot_semantic = val.dataroot_semantic.as_deref().map(expand_home);

        tracing::debug!("Parsed options: {options:?}");
        Ok(options)
    }

    /// Architecture name, if the option file declares one.
    #[must_use]
    pub fn network(&self) -> Option<&str> {
        self.network_g.as_ref().map(|n| n.kind.as_str())
    }
}

/// Name of an option file for output directories: its file name up to the first `.`.
#[must_use]
pub fn config_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy())
        .and_then(|n| n.split('.').next().map(str::to_string))
        .unwrap_or_default()
}

/// Replace a leading `~` with the user's home directory.
#[must_use]
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };

    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}
