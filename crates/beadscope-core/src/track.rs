//! Assigns persistent track IDs to per-frame detections by class-matched
//! greedy circle-IoU.
//!
//! Runs inside the orchestrator, between classification and cache append,
//! so IDs are persisted straight into the cache. The matching strategy is
//! deliberately simple: same-class centre-distance gating, circle IoU,
//! single-pass greedy assignment by descending IoU. The goal is stable
//! overlays across a handful of frames, not optimal multi-object tracking.

use std::collections::HashMap;

use beadscope_models::Ball;

use crate::config::TrackingConfig;

#[derive(Debug, Clone)]
struct Track {
    track_id: u64,
    last_ball: Ball,
    #[allow(dead_code)]
    last_frame_id: u64,
    lost_frames: u32,
}

/// Owns tracker state across the lifetime of one orchestrator run. Not
/// `Clone`: there is exactly one tracker per run, owned by the
/// orchestrator, never shared.
pub struct Tracker {
    cfg: TrackingConfig,
    next_id: u64,
    tracks: HashMap<u64, Track>,
}

impl Tracker {
    pub fn new(cfg: TrackingConfig) -> Self {
        Self {
            cfg,
            next_id: 1,
            tracks: HashMap::new(),
        }
    }

    pub fn reset(&mut self) {
        self.next_id = 1;
        self.tracks.clear();
    }

    /// Assign `track_id` to each ball in `balls`, returning a new vector —
    /// the source mutates in place; here the extra allocation buys
    /// shared-nothing state.
    pub fn update(&mut self, frame_id: u64, balls: Vec<Ball>) -> Vec<Ball> {
        self.age_tracks(false, &Default::default());

        if balls.is_empty() {
            self.prune_tracks();
            return balls;
        }

        if self.tracks.is_empty() {
            return balls
                .into_iter()
                .map(|b| self.assign_new(b, frame_id))
                .collect();
        }

        let candidates = self.build_candidate_matches(&balls);

        let mut matched_dets: std::collections::HashSet<usize> = Default::default();
        let mut matched_tracks: std::collections::HashSet<u64> = Default::default();
        let mut result: Vec<Option<Ball>> = balls.iter().map(|_| None).collect();

        for (_iou, det_idx, track_id) in &candidates {
            if matched_dets.contains(det_idx) || matched_tracks.contains(track_id) {
                continue;
            }
            let mut ball = balls[*det_idx];
            ball.track_id = Some(*track_id);

            let track = self.tracks.get_mut(track_id).expect("candidate track exists");
            track.last_ball = ball;
            track.last_frame_id = frame_id;
            track.lost_frames = 0;

            result[*det_idx] = Some(ball);
            matched_dets.insert(*det_idx);
            matched_tracks.insert(*track_id);
        }

        let mut out = Vec::with_capacity(balls.len());
        for (idx, ball) in balls.into_iter().enumerate() {
            match result[idx].take() {
                Some(matched) => out.push(matched),
                None => out.push(self.assign_new(ball, frame_id)),
            }
        }

        self.age_tracks(true, &matched_tracks);
        self.prune_tracks();
        out
    }

    fn assign_new(&mut self, mut ball: Ball, frame_id: u64) -> Ball {
        let id = self.next_id;
        ball.track_id = Some(id);
        self.tracks.insert(
            id,
            Track {
                track_id: id,
                last_ball: ball,
                last_frame_id: frame_id,
                lost_frames: 0,
            },
        );
        self.next_id += 1;
        ball
    }

    fn build_candidate_matches(&self, balls: &[Ball]) -> Vec<(f64, usize, u64)> {
        let mut matches = Vec::new();
        for (det_idx, ball) in balls.iter().enumerate() {
            for track in self.tracks.values() {
                let prev = &track.last_ball;
                if prev.cls != ball.cls {
                    continue;
                }
                let dist = center_distance(ball, prev);
                if dist > self.cfg.max_center_distance_px {
                    continue;
                }
                let iou = circle_iou(ball, prev);
                if iou < self.cfg.iou_threshold {
                    continue;
                }
                matches.push((iou, det_idx, track.track_id));
            }
        }
        matches.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        matches
    }

    /// Ages tracks only when the frame had at least one detection — tracks
    /// are left un-aged through stretches of empty frames. This mirrors
    /// upstream behaviour and must not be "fixed" independently of the
    /// tracker tests below.
    fn age_tracks(&mut self, seen_any: bool, matched_tracks: &std::collections::HashSet<u64>) {
        if !seen_any {
            return;
        }
        for (track_id, track) in self.tracks.iter_mut() {
            if !matched_tracks.contains(track_id) {
                track.lost_frames += 1;
            }
        }
    }

    fn prune_tracks(&mut self) {
        let max_lost = self.cfg.max_lost_frames;
        self.tracks.retain(|_, t| t.lost_frames <= max_lost);
    }
}

fn center_distance(a: &Ball, b: &Ball) -> f64 {
    let dx = (a.x - b.x) as f64;
    let dy = (a.y - b.y) as f64;
    (dx * dx + dy * dy).sqrt()
}

/// Exact intersection-over-union for two circles, via the standard
/// lens-area formula. Fully-contained case returns `(min_r/max_r)^2`.
fn circle_iou(a: &Ball, b: &Ball) -> f64 {
    let r1 = a.r_px;
    let r2 = b.r_px;
    let d = center_distance(a, b);

    if r1 <= 0.0 || r2 <= 0.0 {
        return 0.0;
    }
    if d >= r1 + r2 {
        return 0.0;
    }
    if d <= (r1 - r2).abs() {
        let smaller = r1.min(r2);
        let larger = r1.max(r2);
        return (smaller * smaller) / (larger * larger);
    }

    let alpha = 2.0 * ((d * d + r1 * r1 - r2 * r2) / (2.0 * d * r1)).acos();
    let beta = 2.0 * ((d * d + r2 * r2 - r1 * r1) / (2.0 * d * r2)).acos();

    let area1 = 0.5 * r1 * r1 * (alpha - alpha.sin());
    let area2 = 0.5 * r2 * r2 * (beta - beta.sin());

    let intersection = area1 + area2;
    let union = std::f64::consts::PI * r1 * r1 + std::f64::consts::PI * r2 * r2 - intersection;
    if union <= 0.0 {
        return 0.0;
    }
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;
    use beadscope_models::SizeClass;

    fn ball(x: i32, y: i32, r_px: f64, cls: u32) -> Ball {
        Ball {
            x,
            y,
            r_px,
            diameter_mm: r_px * 2.0,
            cls: SizeClass::Known(cls),
            conf: 0.9,
            track_id: None,
        }
    }

    #[test]
    fn new_detections_get_fresh_ids() {
        let mut tracker = Tracker::new(TrackingConfig::default());
        let out = tracker.update(0, vec![ball(100, 100, 20.0, 6), ball(300, 300, 15.0, 4)]);
        assert_eq!(out[0].track_id, Some(1));
        assert_eq!(out[1].track_id, Some(2));
    }

    #[test]
    fn matching_detection_keeps_same_id_across_frames() {
        let mut tracker = Tracker::new(TrackingConfig::default());
        let f0 = tracker.update(0, vec![ball(100, 100, 20.0, 6)]);
        let f1 = tracker.update(1, vec![ball(103, 101, 20.0, 6)]);
        assert_eq!(f0[0].track_id, f1[0].track_id);
    }

    #[test]
    fn gap_within_max_lost_frames_preserves_id() {
        let mut tracker = Tracker::new(TrackingConfig::default());
        let f0 = tracker.update(0, vec![ball(100, 100, 20.0, 6)]);
        let _f1 = tracker.update(1, vec![ball(103, 101, 20.0, 6)]);
        let _f2 = tracker.update(2, vec![]);
        let f3 = tracker.update(3, vec![ball(106, 102, 20.0, 6)]);
        assert_eq!(f0[0].track_id, f3[0].track_id);
    }

    #[test]
    fn class_mismatch_never_matches() {
        let mut tracker = Tracker::new(TrackingConfig::default());
        tracker.update(0, vec![ball(100, 100, 20.0, 6)]);
        let f1 = tracker.update(1, vec![ball(101, 100, 20.0, 8)]);
        assert_eq!(f1[0].track_id, Some(2));
    }

    #[test]
    fn fully_contained_circle_iou_matches_area_ratio() {
        let a = ball(0, 0, 10.0, 4);
        let b = ball(0, 0, 20.0, 4);
        let iou = circle_iou(&a, &b);
        assert!((iou - 0.25).abs() < 1e-9);
    }
}
