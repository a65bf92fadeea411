//! Axis-aligned rectangular regions of simulation space.
//!
//! A single type describes both the overall simulation area and the
//! sub-regions the scheduler hands out as units of work. Derived corners are
//! computed on demand.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::error::BeamformingError;
use crate::vector::Vector2;

/// Immutable rectangle given by its minimum corner and its size.
///
/// Simulation space has y pointing up, so the top edge is at `min_corner.y + size.y`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisAlignedRegion {
    min_corner: Vector2,
    size: Vector2,
}

impl AxisAlignedRegion {
    /// Create a region. Both size components must be finite and strictly positive.
    pub fn new(min_corner: Vector2, size: Vector2) -> Result<Self, BeamformingError> {
        if !min_corner.is_finite() || !size.is_finite() || size.x <= 0.0 || size.y <= 0.0 {
            return Err(BeamformingError::InvalidRegion { min_corner, size });
        }
        Ok(Self { min_corner, size })
    }

    pub fn min_corner(&self) -> Vector2 {
        self.min_corner
    }

    pub fn size(&self) -> Vector2 {
        self.size
    }

    pub fn max_corner(&self) -> Vector2 {
        self.min_corner.add(self.size)
    }

    /// Minimum x, maximum y.
    pub fn top_left(&self) -> Vector2 {
        Vector2::new(self.min_corner.x, self.min_corner.y + self.size.y)
    }

    /// Maximum x, minimum y.
    pub fn bottom_right(&self) -> Vector2 {
        Vector2::new(self.min_corner.x + self.size.x, self.min_corner.y)
    }

    /// Inclusive containment test on all four edges.
    pub fn contains(&self, point: Vector2) -> bool {
        let max = self.max_corner();
        self.min_corner.x <= point.x && self.min_corner.y <= point.y && max.x >= point.x && max.y >= point.y
    }

    /// Split into `count` horizontal strips of equal height, ordered from the
    /// bottom edge upward.
    ///
    /// Every strip starts at `min_y + i * height / count`. The last strip ends
    /// exactly on this region's top edge, absorbing floating-point rounding.
    pub fn split_into_strips(&self, count: usize) -> Vec<AxisAlignedRegion> {
        if count == 0 {
            return Vec::new();
        }
        let strip_height = self.size.y / count as f64;
        let top = self.max_corner().y;
        (0..count)
            .map(|i| {
                let min_y = self.min_corner.y + i as f64 * strip_height;
                let height = if i + 1 == count { top - min_y } else { strip_height };
                AxisAlignedRegion {
                    min_corner: Vector2::new(self.min_corner.x, min_y),
                    size: Vector2::new(self.size.x, height),
                }
            })
            .collect()
    }

    /// Split into horizontal strips holding `row_counts[i]` rows of one shared
    /// sample grid, ordered from the bottom edge upward.
    ///
    /// Each strip is `row_counts[i] * height / total_rows` tall, so every strip
    /// keeps the same row pitch and strip edges fall on global row boundaries.
    /// The last strip ends exactly on the top edge. Every count must be non-zero;
    /// the result is empty when no rows are given.
    pub fn split_by_rows(&self, row_counts: &[usize]) -> Vec<AxisAlignedRegion> {
        let total_rows: usize = row_counts.iter().sum();
        if total_rows == 0 {
            return Vec::new();
        }
        let pitch = self.size.y / total_rows as f64;
        let top = self.max_corner().y;
        let mut rows_below = 0;
        row_counts
            .iter()
            .enumerate()
            .map(|(i, &rows)| {
                let min_y = self.min_corner.y + rows_below as f64 * pitch;
                rows_below += rows;
                let height = if i + 1 == row_counts.len() { top - min_y } else { rows as f64 * pitch };
                AxisAlignedRegion {
                    min_corner: Vector2::new(self.min_corner.x, min_y),
                    size: Vector2::new(self.size.x, height),
                }
            })
            .collect()
    }

    /// Map a model-space point into normalized view coordinates in [0,1]².
    ///
    /// (0, 0) is this region's top-left corner; y grows downward as in image
    /// space. Points outside the region map outside the unit square.
    pub fn normalized(&self, point: Vector2) -> Vector2 {
        let top_left = self.top_left();
        Vector2::new((point.x - top_left.x) / self.size.x, (top_left.y - point.y) / self.size.y)
    }
}

impl<'de> Deserialize<'de> for AxisAlignedRegion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct RawRegion {
            min_corner: Vector2,
            size: Vector2,
        }

        let raw = RawRegion::deserialize(deserializer)?;
        AxisAlignedRegion::new(raw.min_corner, raw.size).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for AxisAlignedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Region{{min_corner: {}, size: {}}}", self.min_corner, self.size)
    }
}

/// Map `point` into normalized coordinates of `area`; see [`AxisAlignedRegion::normalized`].
pub fn model_to_normalized_coordinate(point: Vector2, area: &AxisAlignedRegion) -> Vector2 {
    area.normalized(point)
}
