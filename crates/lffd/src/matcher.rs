//! Static assignment of ground-truth faces to receptive-field cells.
//!
//! A cell is a *candidate* for a face if the cell's receptive-field center lies inside the face
//! box. Whether the candidate becomes a positive sample depends on the face size: each detection
//! head is only responsible for faces whose size lies in the head's [`ScaleRange`]. Faces outside
//! of that range turn the cells they cover into *ignored* cells, so that the head is neither
//! trained to detect them nor to report background there.
//!
//! If multiple eligible faces cover a cell, the face with the smallest area is assigned. Faces of
//! equal area are resolved in favor of the one that comes first in the input list.

use std::cmp::Ordering;

use ndarray::{Array2, ArrayView3, Zip};

use crate::rect::{FaceBox, ScaleRange};

/// Assignment value of cells that are excluded from the loss.
pub const IGNORE: i32 = -2;

/// Assignment value of background cells.
pub const BACKGROUND: i32 = -1;

/// Decoded assignment of a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Background,
    Ignore,
    /// The cell is assigned to the face box with this index.
    Matched(usize),
}

impl Cell {
    fn from_raw(raw: i32) -> Self {
        match raw {
            IGNORE => Cell::Ignore,
            i if i >= 0 => Cell::Matched(i as usize),
            _ => Cell::Background,
        }
    }
}

/// Per-cell assignment of one image, as computed by [`Matcher::assign`].
///
/// Both grids are `H x W` and contain either a face box index, [`BACKGROUND`] or [`IGNORE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Classification assignment. May contain [`IGNORE`].
    pub cls: Array2<i32>,
    /// Regression assignment. Never contains [`IGNORE`].
    pub reg: Array2<i32>,
}

impl Assignment {
    fn background(height: usize, width: usize) -> Self {
        Self {
            cls: Array2::from_elem((height, width), BACKGROUND),
            reg: Array2::from_elem((height, width), BACKGROUND),
        }
    }

    /// Returns the classification assignment of the cell at `(row, col)`.
    pub fn cell(&self, row: usize, col: usize) -> Cell {
        Cell::from_raw(self.cls[[row, col]])
    }

    /// Returns the number of cells assigned to a face.
    pub fn num_matched(&self) -> usize {
        self.cls.iter().filter(|&&v| v >= 0).count()
    }

    /// Returns the number of ignored cells.
    pub fn num_ignored(&self) -> usize {
        self.cls.iter().filter(|&&v| v == IGNORE).count()
    }
}

/// Matches ground-truth face boxes to receptive-field centers, gated by face size.
#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    scale_range: ScaleRange,
}

impl Matcher {
    pub fn new(scale_range: ScaleRange) -> Self {
        Self { scale_range }
    }

    pub fn scale_range(&self) -> ScaleRange {
        self.scale_range
    }

    /// Computes the cell assignment of one image.
    ///
    /// `centers` is an `H x W x 2` grid of receptive-field centers (`x, y`), typically
    /// [`RfAnchors::centers`][crate::anchor::RfAnchors::centers]. The returned grids index into
    /// `gt_boxes`.
    #[track_caller]
    pub fn assign(&self, centers: ArrayView3<'_, f32>, gt_boxes: &[FaceBox]) -> Assignment {
        let (height, width, dims) = centers.dim();
        assert_eq!(dims, 2, "rf centers must have shape HxWx2, got {:?}", centers.dim());
        assert!(
            gt_boxes.len() <= i32::MAX as usize,
            "too many face boxes ({})",
            gt_boxes.len()
        );

        let mut assignment = Assignment::background(height, width);
        if gt_boxes.is_empty() {
            return assignment;
        }

        // smallest eligible covering box so far
        let mut best: Array2<Option<MatchKey>> = Array2::from_elem((height, width), None);

        for (index, face) in gt_boxes.iter().enumerate() {
            let eligible = self.scale_range.contains(face.size());
            let key = MatchKey {
                area: face.area(),
                index,
            };

            Zip::indexed(&mut best)
                .and(&mut assignment.cls)
                .for_each(|(row, col), best, cls| {
                    let (x, y) = (centers[[row, col, 0]], centers[[row, col, 1]]);
                    if !face.contains_point(x, y) {
                        return;
                    }

                    if eligible {
                        if best.map_or(true, |current| key < current) {
                            *best = Some(key);
                        }
                    } else {
                        *cls = IGNORE;
                    }
                });
        }

        Zip::from(&mut assignment.cls)
            .and(&mut assignment.reg)
            .and(&best)
            .for_each(|cls, reg, best| {
                if let Some(key) = best {
                    *cls = key.index as i32;
                    *reg = key.index as i32;
                }
            });

        log::trace!(
            "matched {} faces in scale range {}: {} positive cells, {} ignored cells",
            gt_boxes.len(),
            self.scale_range,
            assignment.num_matched(),
            assignment.num_ignored(),
        );

        assignment
    }
}

/// Priority of a face for a cell it covers. Smaller keys win.
#[derive(Debug, Clone, Copy)]
struct MatchKey {
    area: f32,
    index: usize,
}

impl PartialEq for MatchKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MatchKey {}

impl PartialOrd for MatchKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MatchKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.area
            .total_cmp(&other.area)
            .then(self.index.cmp(&other.index))
    }
}
