//! Multi-feature confidence scoring for raw circle candidates.
//!
//! Computes a single gradient-magnitude image per frame and reuses it
//! across every candidate, matching the "per-frame workspace, not
//! persistent scorer state" design: this module exposes no stored state at
//! all — each call recomputes and drops its own gradient field.

use opencv::core::Mat;
use opencv::prelude::*;
use opencv::{core, imgproc};

use beadscope_models::{Features, Geometry, RawDetection, ScoredDetection};

use crate::config::PipelineConfig;
use crate::detect::radius_bounds;
use crate::error::PipelineResult;

struct Gradients {
    magnitude: Mat,
}

impl Gradients {
    fn compute(gray: &Mat, sigma: f64) -> PipelineResult<Self> {
        let ksize = (3i32).max((sigma * 4.0) as i32 | 1);

        let mut gx = Mat::default();
        let mut gy = Mat::default();
        imgproc::sobel(gray, &mut gx, core::CV_64F, 1, 0, ksize, 1.0, 0.0, core::BORDER_DEFAULT)?;
        imgproc::sobel(gray, &mut gy, core::CV_64F, 0, 1, ksize, 1.0, 0.0, core::BORDER_DEFAULT)?;

        let mut gx2 = Mat::default();
        let mut gy2 = Mat::default();
        core::multiply(&gx, &gx, &mut gx2, 1.0, -1)?;
        core::multiply(&gy, &gy, &mut gy2, 1.0, -1)?;

        let mut sum_sq = Mat::default();
        core::add(&gx2, &gy2, &mut sum_sq, &core::no_array(), -1)?;

        let mut magnitude = Mat::default();
        core::sqrt(&sum_sq, &mut magnitude)?;

        Ok(Self { magnitude })
    }

    fn at(&self, x: i32, y: i32) -> Option<f64> {
        if x < 0 || y < 0 || x >= self.magnitude.cols() || y >= self.magnitude.rows() {
            return None;
        }
        self.magnitude.at_2d::<f64>(y, x).ok().copied()
    }
}

/// Score every raw detection against the preprocessed frame.
pub fn score_candidates(
    detections: &[RawDetection],
    preprocessed: &Mat,
    geom: &Geometry,
    cfg: &PipelineConfig,
) -> PipelineResult<Vec<ScoredDetection>> {
    let gradients = Gradients::compute(preprocessed, cfg.edge_gradient_sigma)?;
    let (r_min, r_max) = radius_bounds(geom, cfg);
    let r_min = r_min as f64;

    let mut out = Vec::with_capacity(detections.len());
    for det in detections {
        let features = compute_features(det, preprocessed, &gradients, cfg, r_min, r_max)?;
        let conf = weighted_score(&features, cfg);
        out.push(ScoredDetection {
            x: det.x,
            y: det.y,
            r_px: det.r_px,
            conf,
            features,
        });
    }
    Ok(out)
}

fn compute_features(
    det: &RawDetection,
    gray: &Mat,
    gradients: &Gradients,
    cfg: &PipelineConfig,
    r_min: f64,
    r_max: f64,
) -> PipelineResult<Features> {
    let n = cfg.edge_sample_points.max(1);
    let mut samples = Vec::with_capacity(n as usize);
    for i in 0..n {
        let angle = 2.0 * std::f64::consts::PI * (i as f64) / (n as f64);
        let px = (det.x as f64 + det.r_px * angle.cos()) as i32;
        let py = (det.y as f64 + det.r_px * angle.sin()) as i32;
        if let Some(v) = gradients.at(px, py) {
            samples.push(v);
        }
    }

    let edge_strength = if (samples.len() as f64) < 0.5 * (n as f64) {
        0.0
    } else {
        (mean(&samples) / 100.0).min(1.0)
    };

    let circularity = if !samples.is_empty() && mean(&samples) > 1e-9 {
        let m = mean(&samples);
        (1.0 - std_dev(&samples, m) / m).max(0.0)
    } else {
        0.0
    };

    let interior = compute_interior_uniformity(gray, det.x, det.y, det.r_px, cfg.interior_sample_ratio)?;

    let radius_fit = compute_radius_fit(det.r_px, r_min, r_max);

    Ok(Features {
        edge_strength,
        circularity,
        interior,
        radius_fit,
    })
}

fn compute_interior_uniformity(
    gray: &Mat,
    x: i32,
    y: i32,
    r: f64,
    sample_ratio: f64,
) -> PipelineResult<f64> {
    let h = gray.rows();
    let w = gray.cols();
    let sample_r = (r * sample_ratio) as i32;

    let x1 = (x - sample_r).max(0);
    let x2 = (x + sample_r).min(w);
    let y1 = (y - sample_r).max(0);
    let y2 = (y + sample_r).min(h);

    if x2 <= x1 || y2 <= y1 {
        return Ok(0.0);
    }

    let roi = core::Rect::new(x1, y1, x2 - x1, y2 - y1);
    let patch = Mat::roi(gray, roi)?;

    let mut mean_scalar = core::Scalar::default();
    let mut stddev_scalar = core::Scalar::default();
    core::mean_std_dev(&patch, &mut mean_scalar, &mut stddev_scalar, &core::no_array())?;
    let mean_int = mean_scalar[0];
    let std_int = stddev_scalar[0];

    let brightness_score = (mean_int / 128.0).min(1.0) * ((255.0 - mean_int) / 128.0).min(1.0);
    let uniformity = (1.0 - std_int / 50.0).max(0.0);

    Ok(0.6 * brightness_score + 0.4 * uniformity)
}

fn compute_radius_fit(r: f64, r_min: f64, r_max: f64) -> f64 {
    if r <= r_min || r >= r_max {
        return 0.0;
    }
    let t = (r - r_min) / (r_max - r_min);
    if (0.2..=0.8).contains(&t) {
        1.0
    } else if t < 0.2 {
        t / 0.2
    } else {
        (1.0 - t) / 0.2
    }
}

fn weighted_score(features: &Features, cfg: &PipelineConfig) -> f64 {
    let score = cfg.weight_edge_strength * features.edge_strength
        + cfg.weight_circularity * features.circularity
        + cfg.weight_interior * features.interior
        + cfg.weight_radius_fit * features.radius_fit;
    score.clamp(0.0, 1.0)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_fit_peaks_in_middle_band() {
        assert_eq!(compute_radius_fit(50.0, 0.0, 100.0), 1.0);
        assert_eq!(compute_radius_fit(0.0, 0.0, 100.0), 0.0);
        assert_eq!(compute_radius_fit(100.0, 0.0, 100.0), 0.0);
    }

    #[test]
    fn radius_fit_ramps_at_edges() {
        let low = compute_radius_fit(10.0, 0.0, 100.0);
        assert!(low > 0.0 && low < 1.0);
        let high = compute_radius_fit(90.0, 0.0, 100.0);
        assert!(high > 0.0 && high < 1.0);
    }

    #[test]
    fn weighted_score_clamped_to_unit_range() {
        let cfg = PipelineConfig::default();
        let features = Features {
            edge_strength: 1.0,
            circularity: 1.0,
            interior: 1.0,
            radius_fit: 1.0,
        };
        assert_eq!(weighted_score(&features, &cfg), 1.0);
    }
}
