//! Drum detection, ROI mask generation, and calibration.
//!
//! Finds the mill drum in a single reference frame and establishes the
//! pixel-to-millimetre calibration plus the region of interest used by
//! every later stage.

use opencv::core::{Mat, Point, Scalar, Vec3f, CV_8UC1};
use opencv::prelude::*;
use opencv::{core, imgproc};

use beadscope_models::{Geometry, GeometrySource};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};

/// Caller-supplied overrides, independent of each other: a manual
/// calibration wins for `px_per_mm` only, a manual ROI wins for the
/// detection region only.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeometryOverride {
    pub px_per_mm: Option<f64>,
    pub roi: Option<(i32, i32, i32)>,
}

/// Locate the drum and compute calibration for `frame_bgr`.
///
/// Runs the Hough-based solver up to twice (once for calibration, once for
/// the ROI) unless overrides make a run unnecessary, mirroring the
/// independence of the two override fields.
pub fn solve_drum_geometry(
    frame_bgr: &Mat,
    cfg: &PipelineConfig,
    overrides: GeometryOverride,
) -> PipelineResult<Geometry> {
    let mut gray = Mat::default();
    imgproc::cvt_color(
        frame_bgr,
        &mut gray,
        imgproc::COLOR_BGR2GRAY,
        0,
        core::AlgorithmHint::ALGO_HINT_DEFAULT,
    )?;

    let height = gray.rows();
    let width = gray.cols();
    let min_dim = height.min(width);

    let px_per_mm = match overrides.px_per_mm {
        Some(v) if v > 0.0 => v,
        _ => match detect_drum_circle(&gray, cfg, min_dim)? {
            Some((_, _, radius)) => radius as f64 / (cfg.drum_diameter_mm / 2.0),
            None => {
                let fallback_radius = (min_dim as f64 * 0.42) as i32;
                fallback_radius as f64 / (cfg.drum_diameter_mm / 2.0)
            }
        },
    };

    let (center_x, center_y, radius_px, source) = match overrides.roi {
        Some((cx, cy, r)) => (cx, cy, r, GeometrySource::Manual),
        None => match detect_drum_circle(&gray, cfg, min_dim)? {
            Some((cx, cy, r)) => (cx, cy, r, GeometrySource::Auto),
            None => (
                width / 2,
                height / 2,
                (min_dim as f64 * 0.42) as i32,
                GeometrySource::Fallback,
            ),
        },
    };

    if radius_px <= 0 {
        return Err(PipelineError::GeometryDegenerate(radius_px));
    }

    Ok(Geometry::new(center_x, center_y, radius_px, px_per_mm, source))
}

/// Single-circle Hough search constrained to radii derived from
/// `min_radius_ratio`/`max_radius_ratio`, with a minimum inter-centre
/// distance equal to `min_dim` so at most one circle is ever accepted.
fn detect_drum_circle(
    gray: &Mat,
    cfg: &PipelineConfig,
    min_dim: i32,
) -> PipelineResult<Option<(i32, i32, i32)>> {
    let mut blurred = Mat::default();
    let ksize = cfg.drum_blur_ksize | 1;
    imgproc::gaussian_blur(
        gray,
        &mut blurred,
        core::Size::new(ksize, ksize),
        0.0,
        0.0,
        core::BORDER_DEFAULT,
        core::AlgorithmHint::ALGO_HINT_DEFAULT,
    )?;

    let min_radius = (min_dim as f64 * cfg.drum_min_radius_ratio) as i32;
    let max_radius = (min_dim as f64 * cfg.drum_max_radius_ratio) as i32;

    let mut circles = Mat::default();
    imgproc::hough_circles(
        &blurred,
        &mut circles,
        imgproc::HOUGH_GRADIENT,
        cfg.drum_hough_dp as f64,
        min_dim as f64,
        cfg.drum_hough_param1,
        cfg.drum_hough_param2,
        min_radius,
        max_radius,
    )?;

    if circles.cols() == 0 {
        return Ok(None);
    }

    let best = circles.at_2d::<Vec3f>(0, 0)?;
    Ok(Some((best[0] as i32, best[1] as i32, best[2] as i32)))
}

/// Binary mask, `255` inside the drum circle, `0` elsewhere.
pub fn roi_mask(geometry: &Geometry, h: i32, w: i32) -> PipelineResult<Mat> {
    circle_mask(geometry.center_x, geometry.center_y, geometry.radius_px, h, w)
}

/// Same as [`roi_mask`] but with the radius shrunk by `(1 - margin_ratio)`,
/// excluding an outer rim band.
pub fn inner_roi_mask(geometry: &Geometry, h: i32, w: i32, margin_ratio: f64) -> PipelineResult<Mat> {
    let inner_radius = (geometry.radius_px as f64 * (1.0 - margin_ratio)) as i32;
    circle_mask(geometry.center_x, geometry.center_y, inner_radius, h, w)
}

fn circle_mask(cx: i32, cy: i32, radius: i32, h: i32, w: i32) -> PipelineResult<Mat> {
    let mut mask = Mat::new_rows_cols_with_default(h, w, CV_8UC1, Scalar::all(0.0))?;
    imgproc::circle(
        &mut mask,
        Point::new(cx, cy),
        radius.max(0),
        Scalar::all(255.0),
        -1,
        imgproc::LINE_8,
        0,
    )?;
    Ok(mask)
}

/// `true` if `(x, y)` lies within the drum, shrunk by `margin_ratio`.
/// Uses squared-distance comparison; no square root.
pub fn is_inside(geometry: &Geometry, x: i32, y: i32, margin_ratio: f64) -> bool {
    let dx = (x - geometry.center_x) as f64;
    let dy = (y - geometry.center_y) as f64;
    let dist_sq = dx * dx + dy * dy;
    let radius = geometry.radius_px as f64 * (1.0 - margin_ratio);
    dist_sq <= radius * radius
}

#[cfg(test)]
mod tests {
    use super::*;
    use beadscope_models::GeometrySource;

    fn geometry(cx: i32, cy: i32, r: i32) -> Geometry {
        Geometry::new(cx, cy, r, 2.0, GeometrySource::Manual)
    }

    #[test]
    fn is_inside_accepts_center() {
        let g = geometry(250, 250, 200);
        assert!(is_inside(&g, 250, 250, 0.0));
    }

    #[test]
    fn is_inside_rejects_outside_rim_margin() {
        let g = geometry(250, 250, 200);
        // (445, 250) is 195px from center; inner radius at 12% margin is 176px.
        assert!(!is_inside(&g, 445, 250, 0.12));
    }

    #[test]
    fn effective_radius_matches_margin() {
        let g = geometry(250, 250, 200);
        assert!((g.effective_radius_px(0.12) - 176.0).abs() < 1e-9);
    }
}
