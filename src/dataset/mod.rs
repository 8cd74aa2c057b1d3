//! Paired evaluation datasets.
//!
//! Sample paths are enumerated eagerly when the dataset is opened; images are
//! decoded one sample at a time by [`Dataset::load`].

mod kind;
mod natural;

pub use kind::{DatasetKind, Layout};
pub use natural::{natural_cmp, natural_path_cmp};

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::image::{self, ImageTensor};
use crate::options::SplitOptions;

/// Extensions accepted as dataset images.
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// File locations of one paired sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleSpec {
    /// Low-quality input.
    pub lq_path: PathBuf,
    /// Ground truth.
    pub gt_path: PathBuf,
    /// Side-channel map, for [`Layout::Semantic`] datasets.
    pub semantic_path: Option<PathBuf>,
    /// Scene subdirectory, for grouped layouts.
    pub group: Option<String>,
}

impl SampleSpec {
    /// File stem of the input, used to name outputs.
    #[must_use]
    pub fn stem(&self) -> String {
        self.lq_path
            .file_stem()
            .map_or_else(String::new, |s| s.to_string_lossy().into_owned())
    }
}

/// A decoded sample.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Low-quality input, `(1, 3, H, W)` in [0, 1].
    pub lq: ImageTensor,
    /// Ground truth, same shape as `lq`.
    pub gt: ImageTensor,
    /// Side-channel map, `(1, K, H, W)`.
    pub semantic: Option<ImageTensor>,
}

/// An opened dataset.
#[derive(Debug)]
pub struct Dataset {
    kind: DatasetKind,
    samples: Vec<SampleSpec>,
}

impl Dataset {
    /// Enumerate the samples of `split` using the layout of `kind`.
    ///
    /// # Errors
    ///
    /// Returns an error if the split's scale is not 1, a root directory cannot
    /// be read, or a grouped input has no matching ground truth or side-channel map.
    pub fn open(kind: DatasetKind, split: &SplitOptions) -> Result<Self> {
        if split.scale != 1 {
            return Err(Error::InvalidParameter {
                name: "scale".to_string(),
                reason: format!("enhancement splits use scale 1, got {}", split.scale),
            });
        }

        let samples = match kind.layout() {
            Layout::Flat => flat_samples(&split.dataroot_lq, &split.dataroot_gt)?,
            Layout::Grouped => grouped_samples(&split.dataroot_lq, &split.dataroot_gt, None)?,
            Layout::Semantic => {
                let semantic_root = split.dataroot_semantic.as_deref().ok_or_else(|| {
                    Error::Dataset(format!(
                        "dataset {kind} needs `dataroot_semantic` in the val split"
                    ))
                })?;
                grouped_samples(
                    &split.dataroot_lq,
                    &split.dataroot_gt,
                    Some(semantic_root),
                )?
            }
        };

        tracing::info!("Test dataset {kind}: {} samples", samples.len());

        Ok(Self { kind, samples })
    }

    /// Dataset kind this was opened with.
    #[must_use]
    pub const fn kind(&self) -> &DatasetKind {
        &self.kind
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the dataset has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample locations in evaluation order.
    #[must_use]
    pub fn samples(&self) -> &[SampleSpec] {
        &self.samples
    }

    /// Decode one sample.
    ///
    /// # Errors
    ///
    /// Returns an error if an image cannot be decoded or the images of the
    /// sample differ in size.
    pub fn load(&self, spec: &SampleSpec) -> Result<Sample> {
        let lq = image::load_image(&spec.lq_path)?;
        let gt = image::load_image(&spec.gt_path)?;
        ensure_same_size(&lq, &gt, &spec.gt_path)?;

        let semantic = match &spec.semantic_path {
            Some(path) => {
                let map = image::load_map(path)?;
                ensure_same_size(&lq, &map, path)?;
                Some(map)
            }
            None => None,
        };

        Ok(Sample { lq, gt, semantic })
    }
}

fn ensure_same_size(lq: &ImageTensor, other: &ImageTensor, path: &Path) -> Result<()> {
    let (_, _, h, w) = lq.dim();
    let (_, _, oh, ow) = other.dim();

    if (h, w) != (oh, ow) {
        return Err(Error::Dataset(format!(
            "{} is {ow}x{oh}, input is {w}x{h}",
            path.display()
        )));
    }

    Ok(())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .map_err(|source| Error::Dataset(format!("cannot read {}: {source}", dir.display())))?;

    let mut paths = entries
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    paths.sort_by(|a, b| natural_path_cmp(a, b));

    Ok(paths)
}

/// Images directly inside `dir`, in natural order.
fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(read_dir_sorted(dir)?
        .into_iter()
        .filter(|p| p.is_file() && is_image(p))
        .collect())
}

/// Images of one scene directory, indexed by file stem.
#[derive(Debug, Default)]
struct SceneIndex {
    by_stem: HashMap<String, PathBuf>,
    only: Option<PathBuf>,
}

impl SceneIndex {
    /// List `dir` once. A missing directory gives an empty index.
    fn read(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Ok(Self::default());
        }

        let images = list_images(dir)?;
        let only = match images.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        };
        let by_stem = images
            .into_iter()
            .filter_map(|p| {
                let stem = p.file_stem()?.to_string_lossy().into_owned();
                Some((stem, p))
            })
            .collect();

        Ok(Self { by_stem, only })
    }

    /// Image whose stem is `stem`.
    fn get(&self, stem: &str) -> Option<&PathBuf> {
        self.by_stem.get(stem)
    }

    /// Image whose stem is `stem`, or the scene's single image.
    ///
    /// Several exposures of one scene can share a single reference.
    fn get_or_only(&self, stem: &str) -> Option<&PathBuf> {
        self.get(stem).or(self.only.as_ref())
    }
}

fn flat_samples(lq_root: &Path, gt_root: &Path) -> Result<Vec<SampleSpec>> {
    let inputs = list_images(lq_root)?;
    let targets = list_images(gt_root)?;

    if inputs.len() != targets.len() {
        tracing::warn!(
            "{} has {} images but {} has {}; pairing the first {}",
            lq_root.display(),
            inputs.len(),
            gt_root.display(),
            targets.len(),
            inputs.len().min(targets.len())
        );
    }

    Ok(inputs
        .into_iter()
        .zip(targets)
        .map(|(lq_path, gt_path)| SampleSpec {
            lq_path,
            gt_path,
            semantic_path: None,
            group: None,
        })
        .collect())
}

fn grouped_samples(
    lq_root: &Path,
    gt_root: &Path,
    semantic_root: Option<&Path>,
) -> Result<Vec<SampleSpec>> {
    let mut samples = Vec::new();

    for scene_dir in read_dir_sorted(lq_root)?.into_iter().filter(|p| p.is_dir()) {
        let Some(group) = scene_dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };

        let gt_dir = gt_root.join(&group);
        let gt_index = SceneIndex::read(&gt_dir)?;
        let semantic = semantic_root
            .map(|root| {
                let dir = root.join(&group);
                SceneIndex::read(&dir).map(|index| (dir, index))
            })
            .transpose()?;

        for lq_path in list_images(&scene_dir)? {
            let stem = lq_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();

            let gt_path = gt_index.get_or_only(&stem).cloned().ok_or_else(|| {
                Error::Dataset(format!(
                    "no ground truth for {} under {}",
                    lq_path.display(),
                    gt_dir.display()
                ))
            })?;

            // side-channel maps are per frame, never shared
            let semantic_path = match &semantic {
                Some((dir, index)) => Some(index.get(&stem).cloned().ok_or_else(|| {
                    Error::Dataset(format!(
                        "no side-channel map for {} under {}",
                        lq_path.display(),
                        dir.display()
                    ))
                })?),
                None => None,
            };

            samples.push(SampleSpec {
                lq_path,
                gt_path,
                semantic_path,
                group: Some(group.clone()),
            });
        }
    }

    Ok(samples)
}
