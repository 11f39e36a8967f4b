//! Centralized configuration for the detection pipeline.
//!
//! All fields have defaults (see [`PipelineConfig::default`]); callers
//! override selectively and then call [`PipelineConfig::validate`] before
//! the run starts. Config is an immutable value threaded through every
//! stage, never a global.

use serde::{Deserialize, Serialize};

use beadscope_models::bins::SizeBin;

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    pub enabled: bool,
    pub iou_threshold: f64,
    pub max_center_distance_px: f64,
    pub max_lost_frames: u32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            iou_threshold: 0.30,
            max_center_distance_px: 20.0,
            max_lost_frames: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    // === Drum Detection ===
    pub drum_diameter_mm: f64,
    pub drum_min_radius_ratio: f64,
    pub drum_max_radius_ratio: f64,
    pub drum_hough_dp: i32,
    pub drum_hough_param1: f64,
    pub drum_hough_param2: f64,
    pub drum_blur_ksize: i32,

    // === ROI / Filtering rim ===
    pub rim_margin_ratio: f64,

    // === Preprocessing ===
    pub tophat_ksize: i32,
    pub clahe_clip_limit: f64,
    pub clahe_tile_size: i32,
    pub bilateral_d: i32,
    pub bilateral_sigma_color: f64,
    pub bilateral_sigma_space: f64,
    pub glare_threshold: f64,
    pub glare_replacement: f64,

    // === Candidate generation ===
    pub hough_dp: i32,
    pub hough_param1: f64,
    pub hough_param2_base: f64,
    pub hough_min_dist_ratio: f64,
    pub contour_min_circularity: f64,
    pub min_bead_diameter_mm: f64,
    pub max_bead_diameter_mm: f64,
    pub radius_margin_low: f64,
    pub radius_margin_high: f64,

    // === Confidence scoring ===
    pub weight_edge_strength: f64,
    pub weight_circularity: f64,
    pub weight_interior: f64,
    pub weight_radius_fit: f64,
    pub edge_sample_points: u32,
    pub edge_gradient_sigma: f64,
    pub interior_sample_ratio: f64,

    // === Cleanup filter ===
    pub brightness_threshold: f64,
    pub brightness_patch_size: i32,
    pub nms_overlap_threshold: f64,
    pub min_confidence: f64,

    // === Classification ===
    pub size_bins: Vec<SizeBin>,

    // === Tracking ===
    pub tracking: TrackingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            drum_diameter_mm: 200.0,
            drum_min_radius_ratio: 0.35,
            drum_max_radius_ratio: 0.48,
            drum_hough_dp: 1,
            drum_hough_param1: 50.0,
            drum_hough_param2: 30.0,
            drum_blur_ksize: 5,

            rim_margin_ratio: 0.12,

            tophat_ksize: 15,
            clahe_clip_limit: 2.0,
            clahe_tile_size: 8,
            bilateral_d: 9,
            bilateral_sigma_color: 75.0,
            bilateral_sigma_space: 75.0,
            glare_threshold: 250.0,
            glare_replacement: 200.0,

            hough_dp: 1,
            hough_param1: 50.0,
            hough_param2_base: 25.0,
            hough_min_dist_ratio: 0.5,
            contour_min_circularity: 0.65,
            min_bead_diameter_mm: 3.0,
            max_bead_diameter_mm: 12.0,
            radius_margin_low: 0.7,
            radius_margin_high: 1.5,

            weight_edge_strength: 0.35,
            weight_circularity: 0.25,
            weight_interior: 0.20,
            weight_radius_fit: 0.20,
            edge_sample_points: 36,
            edge_gradient_sigma: 1.0,
            interior_sample_ratio: 0.7,

            brightness_threshold: 50.0,
            brightness_patch_size: 5,
            nms_overlap_threshold: 0.5,
            min_confidence: 0.50,

            size_bins: vec![
                SizeBin { label: 4, min_mm: 3.0, max_mm: 5.0 },
                SizeBin { label: 6, min_mm: 5.0, max_mm: 7.0 },
                SizeBin { label: 8, min_mm: 7.0, max_mm: 9.0 },
                SizeBin { label: 10, min_mm: 9.0, max_mm: 12.0 },
            ],

            tracking: TrackingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Checks invariants that, if violated, must fail the whole run rather
    /// than be tolerated mid-pipeline (`ConfigInvalid`, per the error
    /// taxonomy).
    pub fn validate(&self) -> PipelineResult<()> {
        let weight_sum = self.weight_edge_strength
            + self.weight_circularity
            + self.weight_interior
            + self.weight_radius_fit;
        if (weight_sum - 1.0).abs() > 1e-6 {
            return Err(PipelineError::config_invalid(format!(
                "scorer weights must sum to 1.0, got {weight_sum}"
            )));
        }
        if self.drum_diameter_mm <= 0.0 {
            return Err(PipelineError::config_invalid("drum_diameter_mm must be positive"));
        }
        if self.min_bead_diameter_mm <= 0.0 || self.max_bead_diameter_mm <= self.min_bead_diameter_mm {
            return Err(PipelineError::config_invalid(
                "min_bead_diameter_mm must be positive and less than max_bead_diameter_mm",
            ));
        }
        if !(0.0..1.0).contains(&self.rim_margin_ratio) {
            return Err(PipelineError::config_invalid("rim_margin_ratio must be in [0, 1)"));
        }
        if self.tophat_ksize % 2 == 0 || self.tophat_ksize <= 0 {
            return Err(PipelineError::config_invalid("tophat_ksize must be odd and positive"));
        }
        Ok(())
    }
}
