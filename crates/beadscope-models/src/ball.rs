//! Classified detections and their per-frame container.

use serde::{Deserialize, Serialize};

use crate::bins::SizeClass;

/// A single classified bead.
///
/// `diameter_mm` and `cls` are derived purely from `r_px` and a calibration
/// scalar — see `beadscope_core::classify::reclassify`. Reclassifying at a
/// new calibration never touches `x`, `y`, `r_px`, `conf`, or `track_id`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ball {
    pub x: i32,
    pub y: i32,
    pub r_px: f64,
    pub diameter_mm: f64,
    pub cls: SizeClass,
    pub conf: f64,
    /// Persistent identity across frames, assigned by the tracker.
    /// Absent on detections produced with tracking disabled, and on caches
    /// written before tracking existed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<u64>,
}

/// All detections for a single decoded frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameDetections {
    pub frame_id: u64,
    pub timestamp: f64,
    pub balls: Vec<Ball>,
}

impl FrameDetections {
    pub fn empty(frame_id: u64, timestamp: f64) -> Self {
        Self {
            frame_id,
            timestamp,
            balls: Vec::new(),
        }
    }

    /// `timestamp_s = frame_id / fps` when `fps > 0`, else `0`.
    pub fn timestamp_for(frame_id: u64, fps: f64) -> f64 {
        if fps > 0.0 {
            frame_id as f64 / fps
        } else {
            0.0
        }
    }
}
