//! Drum geometry: pixel-space circle plus calibration.

use serde::{Deserialize, Serialize};

/// Provenance of a [`Geometry`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometrySource {
    /// Found by the Hough-based drum solver.
    Auto,
    /// Loaded from a previously-solved cache entry.
    Cached,
    /// Supplied directly by the caller, bypassing detection.
    Manual,
    /// Drum solver failed; a frame-centred fallback circle was used.
    Fallback,
}

/// The drum, located in pixel space, with its physical-to-pixel calibration.
///
/// Created once per video and never mutated afterwards. `radius_px` and
/// `px_per_mm` are always strictly positive once constructed through
/// [`Geometry::new`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub center_x: i32,
    pub center_y: i32,
    pub radius_px: i32,
    pub px_per_mm: f64,
    pub source: GeometrySource,
}

impl Geometry {
    pub fn new(
        center_x: i32,
        center_y: i32,
        radius_px: i32,
        px_per_mm: f64,
        source: GeometrySource,
    ) -> Self {
        Self {
            center_x,
            center_y,
            radius_px,
            px_per_mm,
            source,
        }
    }

    /// Effective radius after a rim margin is removed, in pixels.
    ///
    /// Never negative; callers that need a strictly-positive value should
    /// check separately (the degenerate case is surfaced as
    /// `GeometryDegenerate` by the drum solver, not here).
    pub fn effective_radius_px(&self, rim_margin_ratio: f64) -> f64 {
        (self.radius_px as f64) * (1.0 - rim_margin_ratio)
    }

    pub fn center(&self) -> (i32, i32) {
        (self.center_x, self.center_y)
    }
}
