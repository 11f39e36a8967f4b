//! Four-stage cleanup filter: rim margin, brightness gate, annulus
//! suppression, confidence threshold + non-max suppression.

use opencv::core::Mat;
use opencv::prelude::*;
use opencv::core;

use beadscope_models::{FilteredDetection, Geometry, ScoredDetection};

use crate::config::PipelineConfig;
use crate::error::PipelineResult;
use crate::geometry::is_inside;

/// Survivor counts after each stage, for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterCounters {
    pub input: usize,
    pub after_rim_margin: usize,
    pub after_brightness: usize,
    pub after_annulus: usize,
    pub after_confidence_and_nms: usize,
}

/// Run all four cleanup stages in fixed order.
pub fn filter_candidates(
    detections: &[ScoredDetection],
    geom: &Geometry,
    preprocessed: &Mat,
    cfg: &PipelineConfig,
) -> PipelineResult<(Vec<FilteredDetection>, FilterCounters)> {
    let mut counters = FilterCounters {
        input: detections.len(),
        ..Default::default()
    };

    let stage1 = filter_rim_margin(detections, geom, cfg.rim_margin_ratio);
    counters.after_rim_margin = stage1.len();

    let stage2 = filter_brightness(&stage1, preprocessed, cfg.brightness_threshold, cfg.brightness_patch_size)?;
    counters.after_brightness = stage2.len();

    let stage3 = filter_annulus(&stage2);
    counters.after_annulus = stage3.len();

    let confidence_gated: Vec<ScoredDetection> = stage3
        .into_iter()
        .filter(|d| d.conf >= cfg.min_confidence)
        .collect();
    let stage4 = apply_nms(&confidence_gated, cfg.nms_overlap_threshold);
    counters.after_confidence_and_nms = stage4.len();

    let filtered = stage4.into_iter().map(FilteredDetection::from).collect();
    Ok((filtered, counters))
}

fn filter_rim_margin(
    detections: &[ScoredDetection],
    geom: &Geometry,
    margin_ratio: f64,
) -> Vec<ScoredDetection> {
    detections
        .iter()
        .copied()
        .filter(|d| is_inside(geom, d.x, d.y, margin_ratio))
        .collect()
}

fn filter_brightness(
    detections: &[ScoredDetection],
    gray: &Mat,
    threshold: f64,
    patch_size: i32,
) -> PipelineResult<Vec<ScoredDetection>> {
    let h = gray.rows();
    let w = gray.cols();
    let half = patch_size / 2;

    let mut out = Vec::with_capacity(detections.len());
    for det in detections {
        let x1 = (det.x - half).max(0);
        let x2 = (det.x + half + 1).min(w);
        let y1 = (det.y - half).max(0);
        let y2 = (det.y + half + 1).min(h);

        if x2 > x1 && y2 > y1 {
            let roi = core::Rect::new(x1, y1, x2 - x1, y2 - y1);
            let patch = Mat::roi(gray, roi)?;
            let mut mean_scalar = core::Scalar::default();
            let mut stddev_scalar = core::Scalar::default();
            core::mean_std_dev(&patch, &mut mean_scalar, &mut stddev_scalar, &core::no_array())?;
            if mean_scalar[0] >= threshold {
                out.push(*det);
            }
        } else {
            // Edge case: keep if we can't sample.
            out.push(*det);
        }
    }
    Ok(out)
}

fn filter_annulus(detections: &[ScoredDetection]) -> Vec<ScoredDetection> {
    if detections.len() < 2 {
        return detections.to_vec();
    }

    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.r_px.partial_cmp(&a.r_px).unwrap_or(std::cmp::Ordering::Equal));

    let mut keep = vec![true; sorted.len()];
    for i in 0..sorted.len() {
        if !keep[i] {
            continue;
        }
        let large = sorted[i];
        for j in (i + 1)..sorted.len() {
            if !keep[j] {
                continue;
            }
            let small = sorted[j];
            let dist = large.center_distance(small.x, small.y);
            if dist < large.r_px * 0.5 && small.r_px < large.r_px * 0.8 {
                keep[j] = false;
            }
        }
    }

    sorted
        .into_iter()
        .zip(keep)
        .filter_map(|(d, k)| if k { Some(d) } else { None })
        .collect()
}

fn apply_nms(detections: &[ScoredDetection], overlap_threshold: f64) -> Vec<ScoredDetection> {
    if detections.len() < 2 {
        return detections.to_vec();
    }

    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.conf.partial_cmp(&a.conf).unwrap_or(std::cmp::Ordering::Equal));

    let mut kept: Vec<ScoredDetection> = Vec::new();
    for det in sorted {
        let is_duplicate = kept.iter().any(|k| {
            let dist = det.center_distance(k.x, k.y);
            let combined_r = det.r_px + k.r_px;
            let overlap = if combined_r > 0.0 {
                1.0 - dist / combined_r
            } else {
                0.0
            };
            overlap > overlap_threshold
        });
        if !is_duplicate {
            kept.push(det);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use beadscope_models::Features;

    fn scored(x: i32, y: i32, r_px: f64, conf: f64) -> ScoredDetection {
        ScoredDetection {
            x,
            y,
            r_px,
            conf,
            features: Features {
                edge_strength: conf,
                circularity: conf,
                interior: conf,
                radius_fit: conf,
            },
        }
    }

    #[test]
    fn nms_keeps_higher_confidence_circle() {
        let dets = vec![scored(250, 250, 30.0, 0.8), scored(255, 255, 28.0, 0.6)];
        let kept = apply_nms(&dets, 0.5);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].x, 250);
    }

    #[test]
    fn annulus_suppresses_concentric_inner_hole() {
        let dets = vec![scored(100, 100, 30.0, 0.9), scored(102, 101, 10.0, 0.7)];
        let kept = filter_annulus(&dets);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].r_px, 30.0);
    }

    #[test]
    fn annulus_keeps_distinct_non_overlapping_circles() {
        let dets = vec![scored(100, 100, 20.0, 0.9), scored(300, 300, 15.0, 0.7)];
        let kept = filter_annulus(&dets);
        assert_eq!(kept.len(), 2);
    }
}
