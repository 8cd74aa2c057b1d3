//! Evaluation loop: pad, restore, crop, score, save.

use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{concatenate, Axis};

use crate::dataset::{Dataset, DatasetKind, SampleSpec};
use crate::error::{Error, Result};
use crate::image::{self, ImageTensor, DEFAULT_FACTOR};
use crate::metrics::{self, Scores};
use crate::model::Device;

use super::engine::{Engine, Restore};

/// Configuration for an evaluation run.
#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// Root of the output tree.
    pub result_dir: PathBuf,

    /// Option file name, the second level of the output tree.
    pub config_name: String,

    /// Weights name, the third level of the output tree.
    pub checkpoint_name: String,

    /// Stride factor inputs are padded to.
    pub factor: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            result_dir: PathBuf::from("./results/"),
            config_name: "RetinexFormer_SDSD_indoor".to_string(),
            checkpoint_name: "SDSD_indoor".to_string(),
            factor: DEFAULT_FACTOR,
        }
    }
}

impl EvalConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.factor == 0 {
            return Err(Error::InvalidParameter {
                name: "factor".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        for (name, value) in [
            ("config_name", &self.config_name),
            ("checkpoint_name", &self.checkpoint_name),
        ] {
            if value.is_empty() {
                return Err(Error::InvalidParameter {
                    name: name.to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Where each image of a sample is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    restored_dir: PathBuf,
    input_dir: Option<PathBuf>,
    gt_dir: Option<PathBuf>,
}

impl OutputLayout {
    /// Output directories for `kind` under the configured result root.
    #[must_use]
    pub fn new(config: &EvalConfig, kind: &DatasetKind) -> Self {
        let dataset_dir = config.result_dir.join(kind.name());
        let with_refs = kind.layout().saves_references();

        Self {
            restored_dir: dataset_dir
                .join(&config.config_name)
                .join(&config.checkpoint_name),
            input_dir: with_refs.then(|| dataset_dir.join("input")),
            gt_dir: with_refs.then(|| dataset_dir.join("gt")),
        }
    }

    /// Directory of restored images.
    #[must_use]
    pub fn restored_dir(&self) -> &Path {
        &self.restored_dir
    }

    /// Path of the restored image for `spec`.
    #[must_use]
    pub fn restored_path(&self, spec: &SampleSpec) -> PathBuf {
        sample_path(&self.restored_dir, spec)
    }

    /// Path of the copied input for `spec`, if inputs are kept.
    #[must_use]
    pub fn input_path(&self, spec: &SampleSpec) -> Option<PathBuf> {
        self.input_dir.as_deref().map(|dir| sample_path(dir, spec))
    }

    /// Path of the copied ground truth for `spec`, if references are kept.
    #[must_use]
    pub fn gt_path(&self, spec: &SampleSpec) -> Option<PathBuf> {
        self.gt_dir.as_deref().map(|dir| sample_path(dir, spec))
    }
}

fn sample_path(dir: &Path, spec: &SampleSpec) -> PathBuf {
    let dir = match &spec.group {
        Some(group) => dir.join(group),
        None => dir.to_path_buf(),
    };
    dir.join(format!("{}.png", spec.stem()))
}

/// Mean scores of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    /// Number of images scored.
    pub count: usize,
    /// Mean PSNR in dB.
    pub psnr: f64,
    /// Mean SSIM.
    pub ssim: f64,
}

/// Pad `input` to `factor`, restore it, crop back, and clamp to [0, 1].
///
/// # Errors
///
/// Returns an error if the input is too small to pad or inference fails.
pub fn enhance<R: Restore + ?Sized>(
    engine: &mut R,
    input: &ImageTensor,
    factor: usize,
) -> Result<ImageTensor> {
    let (padded, padding) = image::pad_reflect(input, factor)?;

    let output = engine.restore(&padded)?;

    let mut restored = image::crop(&output, &padding)?;
    image::clamp_unit(&mut restored);

    Ok(restored)
}

/// Evaluates a restoration network over a dataset.
pub struct Evaluator<R = Engine> {
    config: EvalConfig,
    engine: R,
}

impl Evaluator<Engine> {
    /// Load the ONNX network at `weights` on `device`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the model cannot be loaded.
    pub fn new(config: EvalConfig, weights: &Path, device: Device) -> Result<Self> {
        config.validate()?;

        tracing::info!("Initializing evaluator with config: {config:?}");
        let engine = Engine::load(weights, device)?;
        tracing::info!("Testing using weights: {}", weights.display());

        Ok(Self { config, engine })
    }
}

impl<R: Restore> Evaluator<R> {
    /// Use an existing engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_engine(config: EvalConfig, engine: R) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, engine })
    }

    /// Run every sample of `dataset` through the network, one at a time.
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset is empty or any sample fails.
    pub fn evaluate(&mut self, dataset: &Dataset) -> Result<Summary> {
        if dataset.is_empty() {
            return Err(Error::Dataset(format!(
                "dataset {} has no samples",
                dataset.kind()
            )));
        }

        let layout = OutputLayout::new(&self.config, dataset.kind());
        tracing::info!("Writing results to {}", layout.restored_dir().display());

        let pb = ProgressBar::new(dataset.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} Testing [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        let mut scores = Scores::default();
        for spec in dataset.samples() {
            let (psnr, ssim) = self.evaluate_sample(dataset, spec, &layout)?;
            scores.push(psnr, ssim);
            pb.inc(1);
        }
        pb.finish_with_message("Testing complete");

        let summary = Summary {
            count: scores.len(),
            psnr: scores.mean_psnr().unwrap_or_default(),
            ssim: scores.mean_ssim().unwrap_or_default(),
        };
        tracing::info!(
            "Evaluated {} images: PSNR {:.4}, SSIM {:.4}",
            summary.count,
            summary.psnr,
            summary.ssim
        );

        Ok(summary)
    }

    /// Restore, score, and save one sample. Returns `(psnr, ssim)`.
    fn evaluate_sample(
        &mut self,
        dataset: &Dataset,
        spec: &SampleSpec,
        layout: &OutputLayout,
    ) -> Result<(f64, f64)> {
        let sample = dataset.load(spec)?;

        let input = match &sample.semantic {
            Some(map) => concatenate(Axis(1), &[sample.lq.view(), map.view()]).map_err(|err| {
                Error::ShapeMismatch {
                    expected: format!("side-channel map matching {:?}", sample.lq.dim()),
                    actual: err.to_string(),
                }
            })?,
            None => sample.lq.clone(),
        };

        let restored = enhance(&mut self.engine, &input, self.config.factor)?;

        let psnr = metrics::psnr(&sample.gt, &restored)?;
        let ssim = metrics::ssim(&image::to_ubyte(&sample.gt), &image::to_ubyte(&restored))?;
        tracing::debug!(
            "{}: PSNR {psnr:.4}, SSIM {ssim:.4}",
            spec.lq_path.display()
        );

        image::save_image(&restored, layout.restored_path(spec))?;
        if let Some(path) = layout.input_path(spec) {
            image::save_image(&sample.lq, path)?;
        }
        if let Some(path) = layout.gt_path(spec) {
            image::save_image(&sample.gt, path)?;
        }

        Ok((psnr, ssim))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::SplitOptions;
    use ::image::{GrayImage, Rgb, RgbImage};
    use approx::assert_relative_eq;
    use std::fs;

    /// Returns the first three channels of its input, recording input shapes.
    #[derive(Default)]
    struct Identity {
        seen: Vec<(usize, usize, usize, usize)>,
    }

    impl Restore for Identity {
        fn restore(&mut self, input: &ImageTensor) -> Result<ImageTensor> {
            self.seen.push(input.dim());
            Ok(input
                .slice(ndarray::s![.., ..3, .., ..])
                .to_owned())
        }
    }

    /// Overshoots the valid range so clamping is observable.
    struct Overexpose;

    impl Restore for Overexpose {
        fn restore(&mut self, input: &ImageTensor) -> Result<ImageTensor> {
            Ok(input.mapv(|v| v * 4.0 - 1.0))
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_rgb(path: &Path, width: u32, height: u32) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_fn(width, height, |x, y| Rgb([(x * 9) as u8, (y * 11) as u8, 128]))
            .save(path)
            .unwrap();
    }

    fn config(root: &Path) -> EvalConfig {
        EvalConfig {
            result_dir: root.join("results"),
            config_name: "RetinexFormer_LOL_v1".to_string(),
            checkpoint_name: "LOL_v1".to_string(),
            factor: 16,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(EvalConfig::default().validate().is_ok());
        assert_eq!(EvalConfig::default().factor, 16);
    }

    #[test]
    fn test_invalid_config() {
        let config = EvalConfig {
            factor: 0,
            ..EvalConfig::default()
        };
        assert!(Evaluator::with_engine(config, Identity::default()).is_err());

        let config = EvalConfig {
            checkpoint_name: String::new(),
            ..EvalConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_enhance_pads_crops_and_clamps() {
        let input = ImageTensor::from_elem((1, 3, 20, 30), 0.5);

        let mut identity = Identity::default();
        let out = enhance(&mut identity, &input, 16).unwrap();
        assert_eq!(identity.seen, vec![(1, 3, 32, 32)]);
        assert_eq!(out, input);

        let out = enhance(&mut Overexpose, &input, 16).unwrap();
        assert_eq!(out.dim(), (1, 3, 20, 30));
        assert!(out.iter().all(|&v| (v - 1.0).abs() < f32::EPSILON));
    }

    #[test]
    fn test_enhance_rejects_tiny_input() {
        let input = ImageTensor::zeros((1, 3, 1, 32));
        let err = enhance(&mut Identity::default(), &input, 16).unwrap_err();
        assert!(matches!(err, Error::UnsupportedDimensions { .. }));
    }

    #[test]
    fn test_output_layout() {
        let config = EvalConfig {
            result_dir: PathBuf::from("out"),
            config_name: "cfg".to_string(),
            checkpoint_name: "ckpt".to_string(),
            factor: 16,
        };
        let spec = SampleSpec {
            lq_path: PathBuf::from("data/input/pair3/0007.png"),
            gt_path: PathBuf::from("data/GT/pair3/0007.png"),
            semantic_path: None,
            group: Some("pair3".to_string()),
        };

        let layout = OutputLayout::new(&config, &DatasetKind::SdsdIndoor);
        assert_eq!(
            layout.restored_path(&spec),
            PathBuf::from("out/SDSD_indoor/cfg/ckpt/pair3/0007.png")
        );
        assert_eq!(
            layout.input_path(&spec),
            Some(PathBuf::from("out/SDSD_indoor/input/pair3/0007.png"))
        );
        assert_eq!(
            layout.gt_path(&spec),
            Some(PathBuf::from("out/SDSD_indoor/gt/pair3/0007.png"))
        );

        let flat = SampleSpec {
            lq_path: PathBuf::from("data/low/12.jpg"),
            group: None,
            ..spec
        };
        let layout = OutputLayout::new(&config, &DatasetKind::Custom("LOL_v1".to_string()));
        assert_eq!(
            layout.restored_path(&flat),
            PathBuf::from("out/LOL_v1/cfg/ckpt/12.png")
        );
        assert_eq!(layout.input_path(&flat), None);
        assert_eq!(layout.gt_path(&flat), None);
    }

    #[test]
    fn test_flat_evaluation_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for name in ["1.png", "2.png"] {
            write_rgb(&root.join("low").join(name), 20, 18);
            write_rgb(&root.join("high").join(name), 20, 18);
        }

        let split = SplitOptions {
            dataroot_lq: root.join("low"),
            dataroot_gt: root.join("high"),
            dataroot_semantic: None,
            scale: 1,
        };
        let dataset = Dataset::open(DatasetKind::Custom("LOL_v1".to_string()), &split).unwrap();

        let mut evaluator = Evaluator::with_engine(config(root), Identity::default()).unwrap();
        let summary = evaluator.evaluate(&dataset).unwrap();

        assert_eq!(summary.count, 2);
        assert_relative_eq!(summary.psnr, metrics::PSNR_IDENTICAL);
        assert_relative_eq!(summary.ssim, 1.0, epsilon = 1e-9);

        let out = root.join("results/LOL_v1/RetinexFormer_LOL_v1/LOL_v1");
        assert!(out.join("1.png").is_file());
        assert!(out.join("2.png").is_file());
        assert!(!root.join("results/LOL_v1/input").exists());
    }

    #[test]
    fn test_semantic_evaluation_concatenates_map() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_rgb(&root.join("input/s1/a.png"), 24, 12);
        write_rgb(&root.join("GT/s1/a.png"), 24, 12);
        fs::create_dir_all(root.join("sam/s1")).unwrap();
        GrayImage::new(24, 12).save(root.join("sam/s1/a.png")).unwrap();

        let split = SplitOptions {
            dataroot_lq: root.join("input"),
            dataroot_gt: root.join("GT"),
            dataroot_semantic: Some(root.join("sam")),
            scale: 1,
        };
        let dataset = Dataset::open(DatasetKind::LolV2, &split).unwrap();

        let mut evaluator = Evaluator::with_engine(config(root), Identity::default()).unwrap();
        let summary = evaluator.evaluate(&dataset).unwrap();
        assert_eq!(summary.count, 1);
        assert_eq!(evaluator.engine.seen, vec![(1, 4, 16, 32)]);

        let base = root.join("results/LOLv2");
        assert!(base.join("RetinexFormer_LOL_v1/LOL_v1/s1/a.png").is_file());
        assert!(base.join("input/s1/a.png").is_file());
        assert!(base.join("gt/s1/a.png").is_file());
    }

    #[test]
    fn test_empty_dataset_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("low")).unwrap();
        fs::create_dir_all(dir.path().join("high")).unwrap();

        let split = SplitOptions {
            dataroot_lq: dir.path().join("low"),
            dataroot_gt: dir.path().join("high"),
            dataroot_semantic: None,
            scale: 1,
        };
        let dataset = Dataset::open(DatasetKind::Custom("x".to_string()), &split).unwrap();

        let mut evaluator =
            Evaluator::with_engine(config(dir.path()), Identity::default()).unwrap();
        assert!(matches!(
            evaluator.evaluate(&dataset),
            Err(Error::Dataset(_))
        ));
    }
}
