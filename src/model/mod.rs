//! Model weights and execution device.

mod loader;

pub use loader::{load_session, ModelCache, WeightsSource};

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Device the network runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    /// CPU inference.
    #[default]
    Cpu,
    /// CUDA GPU inference with the given device index.
    Cuda(usize),
}

impl FromStr for Device {
    type Err = Error;

    /// Parse a `--gpus` list such as `0`, `1,2`, or `cpu`.
    ///
    /// Only one device is used; extra ids are ignored with a warning.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("cpu") || s == "-1" {
            return Ok(Self::Cpu);
        }

        let ids = s
            .split(',')
            .map(|id| id.trim().parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| Error::InvalidParameter {
                name: "gpus".to_string(),
                reason: format!("{s:?} is not a comma-separated list of device ids: {err}"),
            })?;

        if ids.len() > 1 {
            tracing::warn!("Multiple devices requested ({s}); running on device {}", ids[0]);
        }

        Ok(Self::Cuda(ids[0]))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda(id) => write!(f, "cuda:{id}"),
        }
    }
}
