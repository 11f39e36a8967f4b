//! Pure calibration-decoupled size classification.
//!
//! `classify` and `reclassify` touch only `diameter_mm`/`cls`; the critical
//! invariant is that recomputing them at a new `px_per_mm` never mutates
//! `x`, `y`, `r_px`, `conf`, or `track_id`.

use beadscope_models::{Ball, FilteredDetection, SizeBin, SizeClass};

/// Assign a size class from radius and calibration, per the configured
/// half-open bins. Diameters outside every bin map to `Unknown`.
pub fn classify_diameter(diameter_mm: f64, bins: &[SizeBin]) -> SizeClass {
    bins.iter()
        .find(|bin| bin.contains(diameter_mm))
        .map(|bin| SizeClass::Known(bin.label))
        .unwrap_or(SizeClass::Unknown)
}

pub fn diameter_mm(r_px: f64, px_per_mm: f64) -> f64 {
    2.0 * r_px / px_per_mm
}

/// Turn filtered detections into classified Balls at a given calibration.
/// `track_id` is left absent; the tracker fills it in afterwards.
pub fn classify(detections: &[FilteredDetection], px_per_mm: f64, bins: &[SizeBin]) -> Vec<Ball> {
    detections
        .iter()
        .map(|d| {
            let diameter = diameter_mm(d.r_px, px_per_mm);
            Ball {
                x: d.x,
                y: d.y,
                r_px: d.r_px,
                diameter_mm: diameter,
                cls: classify_diameter(diameter, bins),
                conf: d.conf,
                track_id: None,
            }
        })
        .collect()
}

/// Recompute `diameter_mm`/`cls` for already-classified balls at a new
/// calibration. `x`, `y`, `r_px`, `conf`, `track_id` are carried through
/// unchanged — this is the calibration-decoupling invariant.
pub fn reclassify(balls: &[Ball], px_per_mm: f64, bins: &[SizeBin]) -> Vec<Ball> {
    balls
        .iter()
        .map(|b| {
            let diameter = diameter_mm(b.r_px, px_per_mm);
            Ball {
                diameter_mm: diameter,
                cls: classify_diameter(diameter, bins),
                ..*b
            }
        })
        .collect()
}
