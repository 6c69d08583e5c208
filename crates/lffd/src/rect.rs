//! Face boxes and face-size ranges.
//!
//! All coordinates are in input-image pixels, with X pointing right and Y pointing down.

use std::fmt;

use anyhow::ensure;

/// An axis-aligned ground-truth face box, stored as `(x_min, y_min, x_max, y_max)`.
///
/// A [`FaceBox`] always has a strictly positive width and height.
#[derive(Clone, Copy, PartialEq)]
pub struct FaceBox {
    x_min: f32,
    y_min: f32,
    x_max: f32,
    y_max: f32,
}

impl FaceBox {
    /// Creates a face box spanning the given coordinates.
    ///
    /// # Panics
    ///
    /// Panics if `x_max <= x_min` or `y_max <= y_min`, or if any coordinate is not finite.
    #[track_caller]
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        match Self::try_new(x_min, y_min, x_max, y_max) {
            Ok(b) => b,
            Err(e) => panic!("{e}"),
        }
    }

    /// Fallible version of [`FaceBox::new`], for boxes that come from external data.
    pub fn try_new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> anyhow::Result<Self> {
        ensure!(
            [x_min, y_min, x_max, y_max].iter().all(|v| v.is_finite()),
            "face box has non-finite coordinates: ({x_min}, {y_min}, {x_max}, {y_max})"
        );
        ensure!(
            x_max > x_min,
            "face box has non-positive width: x_min={x_min}, x_max={x_max}"
        );
        ensure!(
            y_max > y_min,
            "face box has non-positive height: y_min={y_min}, y_max={y_max}"
        );
        Ok(Self {
            x_min,
            y_min,
            x_max,
            y_max,
        })
    }

    /// Creates a face box from its top left corner and its dimensions.
    #[track_caller]
    pub fn from_top_left(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    #[inline]
    pub fn x_min(&self) -> f32 {
        self.x_min
    }

    #[inline]
    pub fn y_min(&self) -> f32 {
        self.y_min
    }

    #[inline]
    pub fn x_max(&self) -> f32 {
        self.x_max
    }

    #[inline]
    pub fn y_max(&self) -> f32 {
        self.y_max
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Returns the face size used for scale gating: the larger of width and height.
    #[inline]
    pub fn size(&self) -> f32 {
        self.width().max(self.height())
    }

    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (
            (self.x_min + self.x_max) * 0.5,
            (self.y_min + self.y_max) * 0.5,
        )
    }

    /// Returns whether the point `(x, y)` lies inside of `self`.
    ///
    /// Points on the box boundary are considered inside.
    #[inline]
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }

    /// Returns the coordinates as `[x_min, y_min, x_max, y_max]`.
    #[inline]
    pub fn to_array(&self) -> [f32; 4] {
        [self.x_min, self.y_min, self.x_max, self.y_max]
    }
}

impl fmt::Debug for FaceBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FaceBox(({}, {}) -> ({}, {}))",
            self.x_min, self.y_min, self.x_max, self.y_max
        )
    }
}

/// A closed interval `[lower, upper]` of face sizes, in pixels.
///
/// Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleRange {
    lower: f32,
    upper: f32,
}

impl ScaleRange {
    /// Creates a new scale range.
    ///
    /// # Panics
    ///
    /// Panics if `lower` is negative or greater than `upper`.
    #[track_caller]
    pub fn new(lower: f32, upper: f32) -> Self {
        assert!(
            lower >= 0.0 && lower <= upper,
            "invalid scale range: lower={lower}, upper={upper}"
        );
        Self { lower, upper }
    }

    #[inline]
    pub fn lower(&self) -> f32 {
        self.lower
    }

    #[inline]
    pub fn upper(&self) -> f32 {
        self.upper
    }

    /// Returns whether a face of the given size falls into this range.
    #[inline]
    pub fn contains(&self, size: f32) -> bool {
        size >= self.lower && size <= self.upper
    }
}

impl fmt::Display for ScaleRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}
