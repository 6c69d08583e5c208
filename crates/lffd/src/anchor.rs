//! Receptive-field anchor generation.
//!
//! Every cell of a detection head's feature map "sees" a fixed-size square region of the input
//! image: its receptive field. The anchors generated here are those regions, one per cell, in
//! input-image pixel coordinates.
//!
//! Unlike the anchors of SSD-style detectors, these anchors have no aspect ratios or learned
//! sizes. They are fully determined by the feature map size and the head's `rf_size` and
//! `rf_stride`.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use ndarray::{s, Array3, ArrayView3};

/// Receptive-field anchors of one feature map.
///
/// The anchor grid is stored unclipped. [`RfAnchors::centers`] is derived from the unclipped
/// grid, so clipping the anchors (via [`RfAnchors::clipped`]) can never shift the centers used
/// for matching.
#[derive(Debug, Clone, PartialEq)]
pub struct RfAnchors {
    rf_size: u32,
    rf_stride: u32,
    /// `H x W x 4` as `x_min, y_min, x_max, y_max`.
    boxes: Array3<f32>,
    /// `H x W x 2` as `x, y`.
    centers: Array3<f32>,
}

impl RfAnchors {
    /// Computes the anchors of a `feature_height x feature_width` feature map.
    ///
    /// The anchor of cell `(row, col)` is centered at `((col + 0.5) * rf_stride, (row + 0.5) *
    /// rf_stride)` and extends `rf_size / 2` pixels in every direction.
    ///
    /// # Panics
    ///
    /// Panics if any of the parameters is zero.
    #[track_caller]
    pub fn new(feature_height: usize, feature_width: usize, rf_size: u32, rf_stride: u32) -> Self {
        assert!(
            feature_height >= 1 && feature_width >= 1,
            "feature map must not be empty (got {feature_height}x{feature_width})"
        );
        assert_ne!(rf_size, 0, "receptive field size must be positive");
        assert_ne!(rf_stride, 0, "receptive field stride must be positive");

        let stride = rf_stride as f32;
        let half = rf_size as f32 * 0.5;

        let centers = Array3::from_shape_fn((feature_height, feature_width, 2), |(y, x, c)| {
            let cell = if c == 0 { x } else { y };
            (cell as f32 + 0.5) * stride
        });
        let boxes = Array3::from_shape_fn((feature_height, feature_width, 4), |(y, x, c)| {
            let center = centers[[y, x, c % 2]];
            if c < 2 {
                center - half
            } else {
                center + half
            }
        });

        log::trace!(
            "generated {feature_height}x{feature_width} rf anchors (size={rf_size}, stride={rf_stride})"
        );

        Self {
            rf_size,
            rf_stride,
            boxes,
            centers,
        }
    }

    #[inline]
    pub fn rf_size(&self) -> u32 {
        self.rf_size
    }

    #[inline]
    pub fn rf_stride(&self) -> u32 {
        self.rf_stride
    }

    /// Returns the feature map height (number of anchor rows).
    pub fn height(&self) -> usize {
        self.boxes.dim().0
    }

    /// Returns the feature map width (number of anchor columns).
    pub fn width(&self) -> usize {
        self.boxes.dim().1
    }

    /// Returns the unclipped anchor boxes as an `H x W x 4` array.
    pub fn boxes(&self) -> ArrayView3<'_, f32> {
        self.boxes.view()
    }

    /// Returns the anchor centers as an `H x W x 2` array of `x, y` pairs.
    pub fn centers(&self) -> ArrayView3<'_, f32> {
        self.centers.view()
    }

    /// Returns the center of the anchor at `(row, col)`.
    pub fn center(&self, row: usize, col: usize) -> (f32, f32) {
        (self.centers[[row, col, 0]], self.centers[[row, col, 1]])
    }

    /// Returns the anchor boxes clamped to the area covered by the feature map.
    ///
    /// X coordinates are clamped to `[0, W * rf_stride]`, Y coordinates to `[0, H * rf_stride]`.
    pub fn clipped(&self) -> Array3<f32> {
        let stride = self.rf_stride as f32;
        let max_x = self.width() as f32 * stride;
        let max_y = self.height() as f32 * stride;

        let mut boxes = self.boxes.clone();
        for (c, max) in [(0, max_x), (1, max_y), (2, max_x), (3, max_y)] {
            boxes
                .slice_mut(s![.., .., c])
                .mapv_inplace(|v| v.clamp(0.0, max));
        }
        boxes
    }
}

/// Generates an `H x W x 4` receptive-field anchor grid, optionally clipped to the feature map's
/// extent in the input image.
#[track_caller]
pub fn generate(
    feature_height: usize,
    feature_width: usize,
    rf_size: u32,
    rf_stride: u32,
    clip: bool,
) -> Array3<f32> {
    let anchors = RfAnchors::new(feature_height, feature_width, rf_size, rf_stride);
    if clip {
        anchors.clipped()
    } else {
        anchors.boxes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct AnchorKey {
    feature_height: usize,
    feature_width: usize,
    rf_size: u32,
    rf_stride: u32,
}

/// Memoizes [`RfAnchors`] by feature map size and receptive field geometry.
///
/// Entries are never modified or evicted after insertion.
#[derive(Debug, Default)]
pub struct AnchorCache {
    entries: Mutex<HashMap<AnchorKey, Arc<RfAnchors>>>,
}

impl AnchorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the anchors for the given parameters, computing them on first use.
    #[track_caller]
    pub fn get(
        &self,
        feature_height: usize,
        feature_width: usize,
        rf_size: u32,
        rf_stride: u32,
    ) -> Arc<RfAnchors> {
        let key = AnchorKey {
            feature_height,
            feature_width,
            rf_size,
            rf_stride,
        };

        // entries are inserted whole, so a poisoned map is still consistent
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries
            .entry(key)
            .or_insert_with(|| {
                Arc::new(RfAnchors::new(
                    feature_height,
                    feature_width,
                    rf_size,
                    rf_stride,
                ))
            })
            .clone()
    }

    /// Returns the number of cached anchor grids.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_shape_and_first_center() {
        let anchors = RfAnchors::new(6, 9, 40, 8);
        assert_eq!(anchors.boxes().dim(), (6, 9, 4));
        assert_eq!(anchors.centers().dim(), (6, 9, 2));
        assert_eq!(anchors.center(0, 0), (4.0, 4.0));
        assert_eq!(anchors.center(2, 5), (44.0, 20.0));

        let b = anchors.boxes();
        assert_eq!(
            [b[[0, 0, 0]], b[[0, 0, 1]], b[[0, 0, 2]], b[[0, 0, 3]]],
            [-16.0, -16.0, 24.0, 24.0]
        );
    }

    #[test]
    fn generation_is_deterministic() {
        let a = generate(7, 5, 55, 4, false);
        let b = generate(7, 5, 55, 4, false);
        assert_eq!(a, b);

        let a = generate(7, 5, 55, 4, true);
        let b = generate(7, 5, 55, 4, true);
        assert_eq!(a, b);
    }

    #[test]
    fn clipping_stays_in_bounds() {
        let (h, w, size, stride) = (5, 8, 80, 16);
        let clipped = generate(h, w, size, stride, true);
        let max_x = (w as u32 * stride) as f32;
        let max_y = (h as u32 * stride) as f32;

        for ((_, _, c), &v) in clipped.indexed_iter() {
            assert!(v >= 0.0, "{v}");
            let max = if c % 2 == 0 { max_x } else { max_y };
            assert!(v <= max, "{v} > {max}");
        }

        // corner cells are clamped, interior ones are not
        assert_eq!(clipped[[0, 0, 0]], 0.0);
        assert_eq!(clipped[[h - 1, w - 1, 2]], max_x);
        assert_eq!(clipped[[h - 1, w - 1, 3]], max_y);
        assert_eq!(clipped[[2, 4, 0]], 72.0 - 40.0);
        assert_eq!(clipped[[2, 4, 2]], 72.0 + 40.0);
    }

    #[test]
    fn clipping_does_not_move_centers() {
        let anchors = RfAnchors::new(3, 3, 100, 10);
        assert_eq!(anchors.center(0, 0), (5.0, 5.0));

        // the midpoint of a clipped corner box is *not* the receptive field center
        let clipped = anchors.clipped();
        let mid_x = (clipped[[0, 0, 0]] + clipped[[0, 0, 2]]) * 0.5;
        assert_ne!(mid_x, 5.0);
    }

    #[test]
    fn clipping_large_extent() {
        let anchors = RfAnchors::new(1, 70_000, 8, 70_000);
        let clipped = anchors.clipped();
        let max_x = 70_000.0f32 * 70_000.0;
        assert_eq!(clipped[[0, 0, 0]], 34_996.0);
        assert_eq!(clipped[[0, 0, 3]], 35_004.0);
        assert!(clipped.iter().all(|&v| v >= 0.0 && v <= max_x));
    }

    #[test]
    #[should_panic(expected = "feature map must not be empty")]
    fn rejects_empty_feature_map() {
        RfAnchors::new(0, 4, 20, 4);
    }

    #[test]
    #[should_panic(expected = "receptive field size must be positive")]
    fn rejects_zero_rf_size() {
        RfAnchors::new(4, 4, 0, 4);
    }

    #[test]
    #[should_panic(expected = "receptive field stride must be positive")]
    fn rejects_zero_rf_stride() {
        RfAnchors::new(4, 4, 20, 0);
    }

    #[test]
    fn cache_returns_matching_grid() {
        let cache = AnchorCache::new();
        let a = cache.get(4, 4, 20, 4);
        let b = cache.get(4, 4, 20, 4);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);

        let c = cache.get(4, 4, 20, 8);
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(c.rf_stride(), 8);
        assert_eq!(c.center(0, 0), (4.0, 4.0));

        let d = cache.get(4, 5, 20, 4);
        assert_eq!(d.width(), 5);
        assert_eq!(cache.len(), 3);
        assert_eq!(*a, RfAnchors::new(4, 4, 20, 4));
    }
}
