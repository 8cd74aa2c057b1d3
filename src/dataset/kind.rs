//! Known evaluation datasets and the directory layout each one uses.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// How a dataset's files are arranged on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Images directly in the input and ground-truth roots, paired by sorted position.
    Flat,
    /// One subdirectory per scene, paired by scene and file stem.
    Grouped,
    /// Like [`Layout::Grouped`], with a side-channel map concatenated to the input.
    Semantic,
}

impl Layout {
    /// Whether inputs and ground truth are copied next to the restored images.
    #[must_use]
    pub const fn saves_references(&self) -> bool {
        matches!(self, Self::Grouped | Self::Semantic)
    }
}

/// Evaluation dataset, resolved once from its identifier at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetKind {
    /// SID, raw-converted short/long exposure pairs per scene.
    Sid,
    /// SMID, multi-exposure scenes with one reference each.
    Smid,
    /// SDSD indoor video, frames grouped per sequence.
    SdsdIndoor,
    /// SDSD outdoor video, frames grouped per sequence.
    SdsdOutdoor,
    /// SID with a segmentation map per frame.
    SidSam,
    /// Paired set with a gray illumination map per frame.
    PairedWithGrayIllum,
    /// LOL-v2 with a side-channel map per image.
    LolV2,
    /// Any other paired set, e.g. LOL-v1 or FiveK.
    Custom(String),
}

impl DatasetKind {
    /// Directory layout of this dataset.
    #[must_use]
    pub const fn layout(&self) -> Layout {
        match self {
            Self::Sid | Self::Smid | Self::SdsdIndoor | Self::SdsdOutdoor => Layout::Grouped,
            Self::SidSam | Self::PairedWithGrayIllum | Self::LolV2 => Layout::Semantic,
            Self::Custom(_) => Layout::Flat,
        }
    }

    /// Identifier as given on the command line, used to name output directories.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Sid => "SID",
            Self::Smid => "SMID",
            Self::SdsdIndoor => "SDSD_indoor",
            Self::SdsdOutdoor => "SDSD_outdoor",
            Self::SidSam => "SID_SAM",
            Self::PairedWithGrayIllum => "Dataset_PairedWithGrayIllumImage",
            Self::LolV2 => "LOLv2",
            Self::Custom(name) => name,
        }
    }
}

impl FromStr for DatasetKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "SID" => Self::Sid,
            "SMID" => Self::Smid,
            "SDSD_indoor" => Self::SdsdIndoor,
            "SDSD_outdoor" => Self::SdsdOutdoor,
            "SID_SAM" => Self::SidSam,
            "Dataset_PairedWithGrayIllumImage" => Self::PairedWithGrayIllum,
            "LOLv2" => Self::LolV2,
            other => Self::Custom(other.to_string()),
        })
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_identifiers_round_trip() {
        for name in [
            "SID",
            "SMID",
            "SDSD_indoor",
            "SDSD_outdoor",
            "SID_SAM",
            "Dataset_PairedWithGrayIllumImage",
            "LOLv2",
        ] {
            let kind: DatasetKind = name.parse().unwrap();
            assert!(!matches!(kind, DatasetKind::Custom(_)), "{name}");
            assert_eq!(kind.to_string(), name);
        }
    }

    #[test]
    fn test_layouts() {
        assert_eq!(DatasetKind::Sid.layout(), Layout::Grouped);
        assert_eq!(DatasetKind::SdsdOutdoor.layout(), Layout::Grouped);
        assert_eq!(DatasetKind::LolV2.layout(), Layout::Semantic);
        assert_eq!(DatasetKind::SidSam.layout(), Layout::Semantic);

        let lol: DatasetKind = "LOL_v1".parse().unwrap();
        assert_eq!(lol, DatasetKind::Custom("LOL_v1".to_string()));
        assert_eq!(lol.layout(), Layout::Flat);
        assert_eq!(lol.name(), "LOL_v1");
    }

    #[test]
    fn test_reference_outputs_follow_layout() {
        assert!(!Layout::Flat.saves_references());
        assert!(Layout::Grouped.saves_references());
        assert!(Layout::Semantic.saves_references());
    }

    #[test]
    fn test_identifiers_are_case_sensitive() {
        let kind: DatasetKind = "sid".parse().unwrap();
        assert_eq!(kind.layout(), Layout::Flat);
    }
}
