//! Detection heads and their target construction.
//!
//! A [`DetectionHead`] operates on one feature map of the backbone. It is characterized by the
//! size and stride of its cells' receptive fields and by the range of face sizes it is
//! responsible for. Only the geometry is modeled here; the convolutional layers that produce the
//! head's outputs live in the training framework.

use std::sync::Arc;

use crate::{
    anchor::{AnchorCache, RfAnchors},
    matcher::Matcher,
    rect::{FaceBox, ScaleRange},
    target::HeadTargets,
};

/// Fixed geometry of one detection head.
#[derive(Debug)]
pub struct DetectionHead {
    index: usize,
    rf_size: u32,
    rf_stride: u32,
    matcher: Matcher,
    anchors: AnchorCache,
}

impl DetectionHead {
    /// Creates a detection head.
    ///
    /// # Parameters
    ///
    /// - `index`: position of the head in the detector, used for logging.
    /// - `rf_size`: side length of a cell's receptive field, in input pixels.
    /// - `rf_stride`: distance between the receptive field centers of adjacent cells.
    /// - `scale_range`: sizes of the faces this head is responsible for.
    ///
    /// # Panics
    ///
    /// Panics if `rf_size` or `rf_stride` is zero.
    #[track_caller]
    pub fn new(index: usize, rf_size: u32, rf_stride: u32, scale_range: ScaleRange) -> Self {
        assert_ne!(rf_size, 0, "receptive field size must be positive");
        assert_ne!(rf_stride, 0, "receptive field stride must be positive");
        Self {
            index,
            rf_size,
            rf_stride,
            matcher: Matcher::new(scale_range),
            anchors: AnchorCache::new(),
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn rf_size(&self) -> u32 {
        self.rf_size
    }

    #[inline]
    pub fn rf_stride(&self) -> u32 {
        self.rf_stride
    }

    #[inline]
    pub fn scale_range(&self) -> ScaleRange {
        self.matcher.scale_range()
    }

    /// Returns the receptive-field anchors of a `height x width` feature map of this head.
    ///
    /// Anchors are computed once per feature map size and shared afterwards.
    pub fn rf_anchors(&self, height: usize, width: usize) -> Arc<RfAnchors> {
        self.anchors.get(height, width, self.rf_size, self.rf_stride)
    }

    /// Builds the training targets of a batch.
    ///
    /// `feature_map` is the `(height, width)` of this head's output, `gt_boxes` contains the
    /// ground-truth faces of every image in the batch. Images without faces produce background
    /// targets.
    #[track_caller]
    pub fn build_targets<B: AsRef<[FaceBox]>>(
        &self,
        feature_map: (usize, usize),
        gt_boxes: &[B],
    ) -> HeadTargets {
        let (height, width) = feature_map;
        let anchors = self.rf_anchors(height, width);
        let mut targets = HeadTargets::background(gt_boxes.len(), height, width);

        for (image, boxes) in gt_boxes.iter().enumerate() {
            let boxes = boxes.as_ref();
            if boxes.is_empty() {
                continue;
            }

            let assignment = self.matcher.assign(anchors.centers(), boxes);
            targets.fill(image, &anchors, &assignment, boxes);
        }

        log::trace!(
            "head {}: {} positive and {} ignored cells in a batch of {} ({}x{})",
            self.index,
            targets.num_positive(),
            targets.num_ignored(),
            gt_boxes.len(),
            height,
            width,
        );

        targets
    }
}
