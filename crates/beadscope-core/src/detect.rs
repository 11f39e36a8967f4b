//! Dual-path circle candidate generation: Hough accumulator and
//! edge-contour analysis, merged without de-duplication.

use opencv::core::{Mat, Vec3f};
use opencv::prelude::*;
use opencv::{core, imgproc};

use beadscope_models::{Geometry, RawDetection, RawSource};

use crate::config::PipelineConfig;
use crate::error::PipelineResult;

/// Minimum and maximum bead radius in pixels, derived from calibration and
/// configuration. `r_min` is never below 3px.
pub fn radius_bounds(geom: &Geometry, cfg: &PipelineConfig) -> (i32, f64) {
    let px_per_mm = geom.px_per_mm;
    let min_mm = cfg.min_bead_diameter_mm / 2.0;
    let max_mm = cfg.max_bead_diameter_mm / 2.0;

    let min_radius = (min_mm * px_per_mm * cfg.radius_margin_low) as i32;
    let max_radius = max_mm * px_per_mm * cfg.radius_margin_high;

    (min_radius.max(3), max_radius)
}

/// Run both candidate-generation paths and concatenate their outputs,
/// Hough-first then contour.
pub fn generate_candidates(
    preprocessed: &Mat,
    geom: &Geometry,
    cfg: &PipelineConfig,
) -> PipelineResult<Vec<RawDetection>> {
    let (r_min, r_max) = radius_bounds(geom, cfg);

    let mut candidates = detect_hough(preprocessed, cfg, r_min, r_max)?;
    candidates.extend(detect_contours(preprocessed, cfg, r_min, r_max)?);
    Ok(candidates)
}

fn detect_hough(
    gray: &Mat,
    cfg: &PipelineConfig,
    r_min: i32,
    r_max: f64,
) -> PipelineResult<Vec<RawDetection>> {
    let height = gray.rows();

    let param2 = (cfg.hough_param2_base
        * ((height as f64 / 1080.0).max(0.0)).sqrt())
    .max(cfg.hough_param2_base);

    let min_dist = ((r_min as f64) * cfg.hough_min_dist_ratio).max(1.0);

    let mut circles = Mat::default();
    imgproc::hough_circles(
        gray,
        &mut circles,
        imgproc::HOUGH_GRADIENT,
        cfg.hough_dp as f64,
        min_dist,
        cfg.hough_param1,
        param2,
        r_min,
        r_max as i32,
    )?;

    let mut out = Vec::with_capacity(circles.cols() as usize);
    for i in 0..circles.cols() {
        let v = circles.at_2d::<Vec3f>(0, i)?;
        out.push(RawDetection {
            x: v[0] as i32,
            y: v[1] as i32,
            r_px: v[2] as f64,
            source: RawSource::Hough,
        });
    }
    Ok(out)
}

fn detect_contours(
    gray: &Mat,
    cfg: &PipelineConfig,
    r_min: i32,
    r_max: f64,
) -> PipelineResult<Vec<RawDetection>> {
    let otsu_thresh = {
        let mut dst = Mat::default();
        imgproc::threshold(
            gray,
            &mut dst,
            0.0,
            255.0,
            imgproc::THRESH_BINARY + imgproc::THRESH_OTSU,
        )?
    };
    let low_thresh = (otsu_thresh * 0.5).max(10.0);
    let high_thresh = otsu_thresh;

    let mut edges = Mat::default();
    imgproc::canny(gray, &mut edges, low_thresh, high_thresh, 3, false)?;

    let kernel = imgproc::get_structuring_element(
        imgproc::MORPH_ELLIPSE,
        core::Size::new(3, 3),
        core::Point::new(-1, -1),
    )?;
    let mut closed = Mat::default();
    imgproc::morphology_ex(
        &edges,
        &mut closed,
        imgproc::MORPH_CLOSE,
        &kernel,
        core::Point::new(-1, -1),
        1,
        core::BORDER_CONSTANT,
        imgproc::morphology_default_border_value()?,
    )?;

    let mut contours = core::Vector::<core::Vector<core::Point>>::new();
    imgproc::find_contours(
        &closed,
        &mut contours,
        imgproc::RETR_EXTERNAL,
        imgproc::CHAIN_APPROX_SIMPLE,
        core::Point::new(0, 0),
    )?;

    let mut out = Vec::new();
    for contour in &contours {
        let area = imgproc::contour_area(&contour, false)?;
        if area < 10.0 {
            continue;
        }
        let perimeter = imgproc::arc_length(&contour, true)?;
        if perimeter <= 0.0 {
            continue;
        }

        let circularity = 4.0 * std::f64::consts::PI * area / (perimeter * perimeter);
        if circularity < cfg.contour_min_circularity {
            continue;
        }

        let mut center = core::Point2f::default();
        let mut radius = 0.0f32;
        imgproc::min_enclosing_circle(&contour, &mut center, &mut radius)?;

        let radius = radius as f64;
        if radius < r_min as f64 || radius > r_max {
            continue;
        }

        out.push(RawDetection {
            x: center.x as i32,
            y: center.y as i32,
            r_px: radius,
            source: RawSource::Contour,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beadscope_models::GeometrySource;

    #[test]
    fn radius_bounds_never_below_three_pixels() {
        let geom = Geometry::new(250, 250, 200, 0.01, GeometrySource::Manual);
        let cfg = PipelineConfig::default();
        let (r_min, r_max) = radius_bounds(&geom, &cfg);
        assert!(r_min >= 3);
        assert!(r_max > 0.0);
    }
}
