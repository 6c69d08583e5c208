//! Detector architecture configurations.
//!
//! An [`ArchConfig`] lists the detection heads of a detector, from the highest-resolution feature
//! map to the lowest. The built-in configurations describe the two published LFFD variants:
//!
//! - `560_25L_8S`: 25 convolutional layers, 8 heads, detects faces from 10 to 560 pixels.
//! - `320_20L_5S`: 20 convolutional layers, 5 heads, detects faces from 10 to 320 pixels.

use anyhow::{bail, Context};
use itertools::Itertools;

use crate::{
    head::DetectionHead,
    rect::{FaceBox, ScaleRange},
    target::HeadTargets,
};

/// Geometry of a single detection head.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadConfig {
    pub rf_size: u32,
    pub rf_stride: u32,
    pub scale_range: ScaleRange,
}

impl HeadConfig {
    #[track_caller]
    pub fn new(rf_size: u32, rf_stride: u32, lower_scale: f32, upper_scale: f32) -> Self {
        Self {
            rf_size,
            rf_stride,
            scale_range: ScaleRange::new(lower_scale, upper_scale),
        }
    }
}

/// Head layout of a multi-head face detector.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchConfig {
    name: String,
    heads: Vec<HeadConfig>,
}

/// `(rf_size, rf_stride, lower_scale, upper_scale)` of every head.
type Preset = (&'static str, &'static [(u32, u32, f32, f32)]);

const PRESETS: &[Preset] = &[
    (
        "560_25L_8S",
        &[
            (55, 4, 10.0, 15.0),
            (71, 4, 15.0, 20.0),
            (111, 8, 20.0, 40.0),
            (143, 8, 40.0, 70.0),
            (223, 16, 70.0, 110.0),
            (383, 32, 110.0, 250.0),
            (511, 32, 250.0, 400.0),
            (639, 32, 400.0, 560.0),
        ],
    ),
    (
        "320_20L_5S",
        &[
            (20, 4, 10.0, 20.0),
            (40, 8, 20.0, 40.0),
            (80, 16, 40.0, 80.0),
            (160, 32, 80.0, 160.0),
            (320, 64, 160.0, 320.0),
        ],
    ),
];

/// Returns the names of all built-in configurations.
pub fn list_configs() -> Vec<&'static str> {
    PRESETS.iter().map(|(name, _)| *name).collect()
}

impl ArchConfig {
    /// Creates a custom configuration.
    pub fn new(name: impl Into<String>, heads: Vec<HeadConfig>) -> Self {
        Self {
            name: name.into(),
            heads,
        }
    }

    /// Looks up a built-in configuration by name.
    pub fn by_name(name: &str) -> anyhow::Result<Self> {
        let Some((name, heads)) = PRESETS.iter().find(|(n, _)| *n == name) else {
            bail!(
                "unknown architecture configuration '{name}' (available: {})",
                list_configs().join(", ")
            );
        };

        Ok(Self::new(
            *name,
            heads
                .iter()
                .map(|&(size, stride, lower, upper)| HeadConfig::new(size, stride, lower, upper))
                .collect(),
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn heads(&self) -> &[HeadConfig] {
        &self.heads
    }

    /// Returns the `(height, width)` of every head's feature map for an input image of the given
    /// size, in head order.
    ///
    /// Each map has one cell per started `rf_stride` pixels of input.
    pub fn feature_map_sizes(&self, input_height: usize, input_width: usize) -> Vec<(usize, usize)> {
        self.heads
            .iter()
            .map(|h| {
                let stride = h.rf_stride as usize;
                (input_height.div_ceil(stride), input_width.div_ceil(stride))
            })
            .collect()
    }

    /// Checks that the configuration describes a usable detector.
    ///
    /// Gaps between the scale ranges of consecutive heads are allowed, but logged: faces with a
    /// size inside a gap are ignored by every head.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.heads.is_empty() {
            bail!("architecture '{}' has no detection heads", self.name);
        }

        for (i, head) in self.heads.iter().enumerate() {
            if head.rf_size == 0 || head.rf_stride == 0 {
                bail!(
                    "head {i} of '{}' has invalid receptive field (size={}, stride={})",
                    self.name,
                    head.rf_size,
                    head.rf_stride,
                );
            }
        }

        let mut ranges = self.heads.iter().map(|h| h.scale_range).collect::<Vec<_>>();
        ranges.sort_by(|a, b| a.lower().total_cmp(&b.lower()));
        for (a, b) in ranges.iter().tuple_windows() {
            if b.lower() > a.upper() {
                log::warn!(
                    "'{}': faces between {} and {} pixels are not covered by any head",
                    self.name,
                    a.upper(),
                    b.lower(),
                );
            }
        }

        Ok(())
    }
}

/// A multi-head detector's target construction.
#[derive(Debug)]
pub struct Lffd {
    config: ArchConfig,
    heads: Vec<DetectionHead>,
}

impl Lffd {
    pub fn new(config: &ArchConfig) -> anyhow::Result<Self> {
        config
            .validate()
            .with_context(|| format!("invalid architecture '{}'", config.name()))?;

        let heads = config
            .heads()
            .iter()
            .enumerate()
            .map(|(i, h)| DetectionHead::new(i, h.rf_size, h.rf_stride, h.scale_range))
            .collect();

        log::debug!(
            "created detector '{}' with {} heads",
            config.name(),
            config.heads().len()
        );

        Ok(Self {
            config: config.clone(),
            heads,
        })
    }

    pub fn config(&self) -> &ArchConfig {
        &self.config
    }

    pub fn heads(&self) -> &[DetectionHead] {
        &self.heads
    }

    /// Builds the targets of every head for a batch.
    ///
    /// `feature_maps` contains the `(height, width)` of every head's feature map, in head order.
    pub fn build_targets<B: AsRef<[FaceBox]>>(
        &self,
        feature_maps: &[(usize, usize)],
        gt_boxes: &[B],
    ) -> anyhow::Result<Vec<HeadTargets>> {
        if feature_maps.len() != self.heads.len() {
            bail!(
                "got {} feature map sizes for {} detection heads",
                feature_maps.len(),
                self.heads.len()
            );
        }
        if let Some((i, _)) = feature_maps
            .iter()
            .find_position(|(h, w)| *h == 0 || *w == 0)
        {
            bail!("feature map of head {i} is empty: {:?}", feature_maps[i]);
        }

        Ok(self
            .heads
            .iter()
            .zip(feature_maps)
            .map(|(head, &fmap)| head.build_targets(fmap, gt_boxes))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        assert_eq!(list_configs(), ["560_25L_8S", "320_20L_5S"]);
        for name in list_configs() {
            let config = ArchConfig::by_name(name).unwrap();
            assert_eq!(config.name(), name);
            config.validate().unwrap();
        }

        let config = ArchConfig::by_name("320_20L_5S").unwrap();
        let sizes = config.heads().iter().map(|h| h.rf_size).collect::<Vec<_>>();
        assert_eq!(sizes, [20, 40, 80, 160, 320]);
        assert_eq!(config.heads()[4].scale_range, ScaleRange::new(160.0, 320.0));
        assert_eq!(ArchConfig::by_name("560_25L_8S").unwrap().heads().len(), 8);
    }

    #[test]
    fn unknown_config_lists_available() {
        let err = ArchConfig::by_name("lffd_v3").unwrap_err().to_string();
        assert!(err.contains("lffd_v3"), "{err}");
        assert!(err.contains("320_20L_5S"), "{err}");
    }

    #[test]
    fn empty_config_is_rejected() {
        let config = ArchConfig::new("empty", Vec::new());
        assert!(config.validate().is_err());
        assert!(Lffd::new(&config).is_err());
    }

    #[test]
    fn gaps_are_allowed() {
        let config = ArchConfig::new(
            "gappy",
            vec![HeadConfig::new(20, 4, 10.0, 20.0), HeadConfig::new(80, 16, 40.0, 80.0)],
        );
        config.validate().unwrap();
    }

    #[test]
    fn heads_own_their_scale() {
        let config = ArchConfig::by_name("320_20L_5S").unwrap();
        let lffd = Lffd::new(&config).unwrap();
        let fmaps = config
            .heads()
            .iter()
            .map(|h| (320 / h.rf_stride as usize, 320 / h.rf_stride as usize))
            .collect::<Vec<_>>();

        // one face per head range, far enough apart to not overlap
        let gt = [[
            FaceBox::from_top_left(10.0, 10.0, 15.0, 15.0),
            FaceBox::from_top_left(200.0, 10.0, 30.0, 30.0),
            FaceBox::from_top_left(10.0, 60.0, 60.0, 60.0),
            FaceBox::from_top_left(150.0, 60.0, 120.0, 120.0),
            FaceBox::from_top_left(0.0, 0.0, 300.0, 140.0),
        ]];
        let targets = lffd.build_targets(&fmaps, &gt).unwrap();
        assert_eq!(targets.len(), 5);

        for (head, t) in lffd.heads().iter().zip(&targets) {
            assert!(t.num_positive() > 0, "head {} has no positives", head.index());
            assert!(t.num_ignored() > 0, "head {} has no ignores", head.index());
            let anchors = head.rf_anchors(fmaps[head.index()].0, fmaps[head.index()].1);

            for ((_, row, col), _) in t.objectness_mask.indexed_iter().filter(|(_, &b)| b) {
                let decoded = t.decode_cell(0, row, col, &anchors).unwrap();
                let face = FaceBox::new(decoded[0], decoded[1], decoded[2], decoded[3]);
                assert!(
                    head.scale_range().contains(face.size().round()),
                    "head {} got face of size {}",
                    head.index(),
                    face.size()
                );
            }
        }
    }

    #[test]
    fn feature_maps_cover_input() {
        let config = ArchConfig::by_name("320_20L_5S").unwrap();
        assert_eq!(
            config.feature_map_sizes(1366, 1024),
            [(342, 256), (171, 128), (86, 64), (43, 32), (22, 16)]
        );

        // a face at the bottom of a tall image still gets positives
        let lffd = Lffd::new(&config).unwrap();
        let gt = [[FaceBox::from_top_left(500.0, 1330.0, 30.0, 30.0)]];
        let targets = lffd
            .build_targets(&config.feature_map_sizes(1366, 1024), &gt)
            .unwrap();
        assert!(targets[1].num_positive() > 0);
    }

    #[test]
    fn feature_map_count_must_match() {
        let lffd = Lffd::new(&ArchConfig::by_name("320_20L_5S").unwrap()).unwrap();
        let gt: [Vec<FaceBox>; 0] = [];
        assert!(lffd.build_targets(&[(80, 80)], &gt).is_err());
        assert!(lffd
            .build_targets(&[(80, 80), (40, 40), (20, 0), (10, 10), (5, 5)], &gt)
            .is_err());
    }
}
