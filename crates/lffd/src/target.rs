//! Dense training targets of a detection head.

use ndarray::{s, Array3, Array4, Axis, Zip};

use crate::{
    anchor::RfAnchors,
    matcher::{Assignment, IGNORE},
    rect::FaceBox,
};

/// Training targets of one detection head for a batch of images.
///
/// All arrays are indexed by `[image, row, col]`, `regs` has an additional trailing dimension of
/// size 4.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadTargets {
    /// Classification label: 1 for face cells, 0 otherwise.
    pub cls: Array3<u8>,
    /// Regression targets `(x_min, y_min, x_max, y_max)`, encoded with [`encode_box`].
    ///
    /// Only meaningful where `reg_mask` is set, zero elsewhere.
    pub regs: Array4<f32>,
    /// Cells assigned to a face.
    pub objectness_mask: Array3<bool>,
    /// Cells with valid regression targets.
    pub reg_mask: Array3<bool>,
    /// Cells that must not contribute to the loss.
    pub ignore_mask: Array3<bool>,
}

impl HeadTargets {
    /// Creates all-background targets for `batch_size` images.
    pub fn background(batch_size: usize, height: usize, width: usize) -> Self {
        let shape = (batch_size, height, width);
        Self {
            cls: Array3::zeros(shape),
            regs: Array4::zeros((batch_size, height, width, 4)),
            objectness_mask: Array3::from_elem(shape, false),
            reg_mask: Array3::from_elem(shape, false),
            ignore_mask: Array3::from_elem(shape, false),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.cls.dim().0
    }

    /// Returns the feature map size as `(height, width)`.
    pub fn feature_size(&self) -> (usize, usize) {
        let (_, h, w) = self.cls.dim();
        (h, w)
    }

    pub fn num_positive(&self) -> usize {
        self.objectness_mask.iter().filter(|&&b| b).count()
    }

    pub fn num_ignored(&self) -> usize {
        self.ignore_mask.iter().filter(|&&b| b).count()
    }

    /// Writes the targets of image `image` from its cell assignment.
    pub(crate) fn fill(
        &mut self,
        image: usize,
        anchors: &RfAnchors,
        assignment: &Assignment,
        gt_boxes: &[FaceBox],
    ) {
        let mut cls = self.cls.index_axis_mut(Axis(0), image);
        let mut objectness = self.objectness_mask.index_axis_mut(Axis(0), image);
        let mut reg_mask = self.reg_mask.index_axis_mut(Axis(0), image);
        let mut ignore = self.ignore_mask.index_axis_mut(Axis(0), image);
        let mut regs = self.regs.index_axis_mut(Axis(0), image);

        Zip::from(&assignment.cls)
            .and(&mut cls)
            .and(&mut objectness)
            .and(&mut ignore)
            .for_each(|&assigned, cls, objectness, ignore| {
                if assigned >= 0 {
                    *cls = 1;
                    *objectness = true;
                } else if assigned == IGNORE {
                    *ignore = true;
                }
            });

        Zip::indexed(&assignment.reg)
            .and(&mut reg_mask)
            .for_each(|(row, col), &assigned, reg_mask| {
                if assigned < 0 {
                    return;
                }

                *reg_mask = true;
                let encoded = encode_box(
                    &gt_boxes[assigned as usize],
                    anchors.center(row, col),
                    anchors.rf_size(),
                );
                for (dst, v) in regs.slice_mut(s![row, col, ..]).iter_mut().zip(encoded) {
                    *dst = v;
                }
            });
    }

    /// Reconstructs the face box stored at a cell with a set `reg_mask`.
    ///
    /// Returns [`None`] if the cell has no regression target.
    pub fn decode_cell(
        &self,
        image: usize,
        row: usize,
        col: usize,
        anchors: &RfAnchors,
    ) -> Option<[f32; 4]> {
        if !self.reg_mask[[image, row, col]] {
            return None;
        }

        let r = self.regs.slice(s![image, row, col, ..]);
        Some(decode_box(
            [r[0], r[1], r[2], r[3]],
            anchors.center(row, col),
            anchors.rf_size(),
        ))
    }
}

/// Encodes a face box relative to a receptive field.
///
/// Every coordinate is offset by the receptive-field center and normalized by half the
/// receptive-field size: `(coord - center) / (rf_size / 2)`.
pub fn encode_box(face: &FaceBox, center: (f32, f32), rf_size: u32) -> [f32; 4] {
    let half = rf_size as f32 * 0.5;
    let (cx, cy) = center;
    [
        (face.x_min() - cx) / half,
        (face.y_min() - cy) / half,
        (face.x_max() - cx) / half,
        (face.y_max() - cy) / half,
    ]
}

/// Inverse of [`encode_box`].
pub fn decode_box(regs: [f32; 4], center: (f32, f32), rf_size: u32) -> [f32; 4] {
    let half = rf_size as f32 * 0.5;
    let (cx, cy) = center;
    [
        cx + regs[0] * half,
        cy + regs[1] * half,
        cx + regs[2] * half,
        cy + regs[3] * half,
    ]
}
