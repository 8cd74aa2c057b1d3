//! Weights resolution and session loading.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::Session;

use crate::error::{Error, Result};

use super::Device;

/// Where the network weights come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightsSource {
    /// An ONNX file on disk.
    Local(PathBuf),
    /// An ONNX file served over HTTP(S), downloaded once into the cache.
    Remote(String),
}

impl WeightsSource {
    /// Classify a `--weights` argument.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value.starts_with("http://") || value.starts_with("https://") {
            Self::Remote(value.to_string())
        } else {
            Self::Local(PathBuf::from(value))
        }
    }

    /// File name of the weights, without any query string.
    #[must_use]
    pub fn file_name(&self) -> String {
        match self {
            Self::Local(path) => path
                .file_name()
                .map_or_else(String::new, |n| n.to_string_lossy().into_owned()),
            Self::Remote(url) => {
                let path = url.split(['?', '#']).next().unwrap_or(url);
                path.rsplit('/').next().unwrap_or(path).to_string()
            }
        }
    }

    /// Location of the weights inside the cache, `None` for local files.
    ///
    /// Built from the URL's host and path segments, so two URLs that share a
    /// file name never share a cache entry.
    #[must_use]
    pub fn cache_key(&self) -> Option<PathBuf> {
        let Self::Remote(url) = self else {
            return None;
        };

        let path = url.split(['?', '#']).next().unwrap_or(url);
        let path = path.split_once("://").map_or(path, |(_, rest)| rest);

        let key: PathBuf = path
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
            .map(|segment| segment.replace(':', "_"))
            .collect();

        Some(key)
    }

    /// Name used for the checkpoint's output directory: the file name up to its first `.`.
    #[must_use]
    pub fn checkpoint_name(&self) -> String {
        let name = self.file_name();
        name.split('.').next().unwrap_or_default().to_string()
    }
}

/// Manages the weights cache directory and downloads.
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a new weights cache.
    ///
    /// Uses the platform-appropriate cache directory:
    /// - Windows: `%LOCALAPPDATA%\lowlight-eval\weights`
    /// - Linux: `~/.cache/lowlight-eval/weights`
    /// - macOS: `~/Library/Caches/lowlight-eval/weights`
    ///
    /// Nothing is created on disk until a download happens.
    #[must_use]
    pub fn new() -> Self {
        let base = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::at(base.join("lowlight-eval").join("weights"))
    }

    /// Create a cache rooted at `cache_dir`.
    #[must_use]
    pub const fn at(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Get a local path for the weights, downloading them if necessary.
    ///
    /// The cache directory is only created for remote weights.
    ///
    /// # Errors
    ///
    /// Returns an error if a local file is missing or a download fails.
    pub fn resolve(&self, source: &WeightsSource) -> Result<PathBuf> {
        match source {
            WeightsSource::Local(path) => {
                if !path.is_file() {
                    return Err(Error::InvalidParameter {
                        name: "weights".to_string(),
                        reason: format!("{} does not exist", path.display()),
                    });
                }
                Ok(path.clone())
            }
            WeightsSource::Remote(url) => {
                let name = source.file_name();
                if name.is_empty() {
                    return Err(Error::InvalidParameter {
                        name: "weights".to_string(),
                        reason: format!("cannot derive a file name from {url}"),
                    });
                }

                let key = source.cache_key().unwrap_or_else(|| PathBuf::from(&name));
                let path = self.cache_dir.join(key);
                if path.exists() {
                    tracing::debug!("Using cached weights {}", path.display());
                } else {
                    if let Some(parent) = path.parent() {
                        fs::create_dir_all(parent).map_err(|source| Error::CacheDir {
                            path: parent.to_path_buf(),
                            source,
                        })?;
                    }
                    download_file(url, &path, &name)?;
                }
                Ok(path)
            }
        }
    }
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Load an ONNX session on `device`.
///
/// CUDA sessions register the CPU provider as a fallback, so a missing GPU
/// runtime degrades to CPU execution instead of failing.
///
/// # Errors
///
/// Returns an error if the model cannot be loaded.
pub fn load_session(path: &Path, device: Device) -> Result<Session> {
    let name = path.display().to_string();
    let model_err = |source: ort::Error| Error::ModelLoad {
        name: name.clone(),
        source,
    };

    let builder = Session::builder().map_err(model_err)?;

    let builder = match device {
        Device::Cpu => builder.with_execution_providers([CPUExecutionProvider::default().build()]),
        Device::Cuda(device_id) => builder.with_execution_providers([
            CUDAExecutionProvider::default()
                .with_device_id(i32::try_from(device_id).unwrap_or(i32::MAX))
                .build(),
            CPUExecutionProvider::default().build(),
        ]),
    }
    .map_err(model_err)?;

    tracing::info!("Loading {name} on {device}");
    builder.commit_from_file(path).map_err(model_err)
}

/// Download a file from a URL to a path with progress indication.
fn download_file(url: &str, path: &Path, name: &str) -> Result<()> {
    tracing::info!("Downloading {name} from {url}");

    let download_err = |source: reqwest::Error| Error::ModelDownload {
        name: name.to_string(),
        source,
    };

    let client = reqwest::blocking::Client::new();
    let response = client
        .get(url)
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .map_err(download_err)?;

    let pb = match response.content_length() {
        Some(total) => ProgressBar::new(total),
        None => ProgressBar::new_spinner(),
    };
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(format!("Downloading {name}"));

    // Write to a temporary file first, then rename for atomicity
    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)?;

    let mut downloaded = 0u64;
    let mut reader = response;

    loop {
        let mut buffer = [0u8; 8192];
        let bytes_read = std::io::Read::read(&mut reader, &mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        file.write_all(&buffer[..bytes_read])?;
        downloaded += bytes_read as u64;
        pb.set_position(downloaded);
    }

    pb.finish_with_message(format!("Downloaded {name}"));

    fs::rename(&temp_path, path)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source() {
        assert_eq!(
            WeightsSource::parse("pretrained_weights/SDSD_indoor.onnx"),
            WeightsSource::Local(PathBuf::from("pretrained_weights/SDSD_indoor.onnx"))
        );
        assert!(matches!(
            WeightsSource::parse("https://example.com/w/LOL_v2_real.onnx"),
            WeightsSource::Remote(_)
        ));
    }

    #[test]
    fn test_checkpoint_name_stops_at_first_dot() {
        let local = WeightsSource::parse("weights/SDSD_indoor.best.onnx");
        assert_eq!(local.checkpoint_name(), "SDSD_indoor");

        let remote = WeightsSource::parse("https://host/a/MST_Plus_Plus.onnx?download=1");
        assert_eq!(remote.file_name(), "MST_Plus_Plus.onnx");
        assert_eq!(remote.checkpoint_name(), "MST_Plus_Plus");
    }

    #[test]
    fn test_resolve_missing_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::at(dir.path().join("cache"));

        let err = cache
            .resolve(&WeightsSource::Local(dir.path().join("absent.onnx")))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn test_resolve_local_leaves_cache_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let weights = dir.path().join("SDSD_indoor.onnx");
        fs::write(&weights, b"onnx").unwrap();

        let cache = ModelCache::at(dir.path().join("cache"));
        let path = cache.resolve(&WeightsSource::Local(weights.clone())).unwrap();

        assert_eq!(path, weights);
        assert!(!dir.path().join("cache").exists());
    }

    #[test]
    fn test_resolve_uses_cached_download() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::at(dir.path().to_path_buf());
        let cached = dir.path().join("invalid.invalid").join("model.onnx");
        fs::create_dir_all(cached.parent().unwrap()).unwrap();
        fs::write(&cached, b"cached").unwrap();

        // never touches the network when the file is already cached
        let path = cache
            .resolve(&WeightsSource::Remote(
                "https://invalid.invalid/model.onnx".to_string(),
            ))
            .unwrap();
        assert_eq!(path, cached);
    }

    #[test]
    fn test_cache_key_follows_url_path() {
        let source =
            WeightsSource::parse("https://host:8080/a/../LOL_v1/model.onnx?download=1");
        assert_eq!(
            source.cache_key(),
            Some(PathBuf::from("host_8080/a/LOL_v1/model.onnx"))
        );
        assert_eq!(WeightsSource::parse("w/model.onnx").cache_key(), None);
    }

    #[test]
    fn test_same_file_name_from_different_urls_is_cached_apart() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::at(dir.path().to_path_buf());

        let lol = WeightsSource::parse("https://invalid.invalid/LOL_v1/model.onnx");
        let sdsd = WeightsSource::parse("https://invalid.invalid/SDSD_indoor/model.onnx");
        for source in [&lol, &sdsd] {
            let path = dir.path().join(source.cache_key().unwrap());
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"cached").unwrap();
        }

        let lol_path = cache.resolve(&lol).unwrap();
        let sdsd_path = cache.resolve(&sdsd).unwrap();
        assert_ne!(lol_path, sdsd_path);
        assert!(lol_path.ends_with("LOL_v1/model.onnx"));
        assert!(sdsd_path.ends_with("SDSD_indoor/model.onnx"));
    }
}
