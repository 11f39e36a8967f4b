//! Handwritten property tests driving `rand::rngs::StdRng` seeded per test,
//! in place of a `proptest` dependency (none exists anywhere in the
//! reference corpus).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use beadscope_core::filter::filter_candidates;
use beadscope_core::geometry::is_inside;
use beadscope_core::config::PipelineConfig;
use beadscope_models::{Features, Geometry, GeometrySource, ScoredDetection};
use opencv::core::{Mat, Scalar};

fn blank_gray(h: i32, w: i32) -> Mat {
    Mat::new_rows_cols_with_default(h, w, opencv::core::CV_8UC1, Scalar::all(0.0)).unwrap()
}

fn random_scored(rng: &mut StdRng, w: i32, h: i32) -> ScoredDetection {
    let conf: f64 = rng.random_range(0.0..=1.0);
    ScoredDetection {
        x: rng.random_range(0..w),
        y: rng.random_range(0..h),
        r_px: rng.random_range(2.0..60.0),
        conf,
        features: Features {
            edge_strength: conf,
            circularity: conf,
            interior: conf,
            radius_fit: conf,
        },
    }
}

/// Invariant 3: every detection that survives filtering satisfies
/// `is_inside` at the configured rim margin.
#[test]
fn roi_containment_holds_for_random_candidates() {
    let mut rng = StdRng::seed_from_u64(42);
    let geom = Geometry::new(250, 250, 200, 2.0, GeometrySource::Auto);
    let cfg = PipelineConfig::default();
    let gray = blank_gray(500, 500);

    for _ in 0..200 {
        let candidates: Vec<ScoredDetection> = (0..20).map(|_| random_scored(&mut rng, 500, 500)).collect();
        let (filtered, _) = filter_candidates(&candidates, &geom, &gray, &cfg).unwrap();
        for det in &filtered {
            assert!(is_inside(&geom, det.x, det.y, cfg.rim_margin_ratio));
        }
    }
}

/// Invariant 4: confidence stays in `[0, 1]` regardless of how wild the
/// input features are (generation already clamps to `[0,1]` for realism,
/// but the scorer's own clamp is what this test actually exercises via
/// the filter's confidence-gate pass-through).
#[test]
fn confidence_always_in_unit_range() {
    let mut rng = StdRng::seed_from_u64(7);
    let geom = Geometry::new(250, 250, 200, 2.0, GeometrySource::Auto);
    let cfg = PipelineConfig::default();
    let gray = blank_gray(500, 500);

    for _ in 0..200 {
        let candidates: Vec<ScoredDetection> = (0..10).map(|_| random_scored(&mut rng, 500, 500)).collect();
        let (filtered, _) = filter_candidates(&candidates, &geom, &gray, &cfg).unwrap();
        for det in &filtered {
            assert!(det.conf >= 0.0 && det.conf <= 1.0);
        }
    }
}

/// Invariant 5: raising `min_confidence` never increases the survivor set.
#[test]
fn raising_min_confidence_never_adds_survivors() {
    let mut rng = StdRng::seed_from_u64(99);
    let geom = Geometry::new(250, 250, 200, 2.0, GeometrySource::Auto);
    let gray = blank_gray(500, 500);

    for _ in 0..100 {
        let candidates: Vec<ScoredDetection> = (0..15).map(|_| random_scored(&mut rng, 500, 500)).collect();

        let mut loose = PipelineConfig::default();
        loose.min_confidence = 0.1;
        let mut strict = PipelineConfig::default();
        strict.min_confidence = 0.9;

        let (loose_survivors, _) = filter_candidates(&candidates, &geom, &gray, &loose).unwrap();
        let (strict_survivors, _) = filter_candidates(&candidates, &geom, &gray, &strict).unwrap();

        assert!(strict_survivors.len() <= loose_survivors.len());
    }
}

/// Invariant 5 (second clause): tightening `nms_overlap_threshold` never
/// increases the survivor set.
#[test]
fn tightening_nms_overlap_never_adds_survivors() {
    let mut rng = StdRng::seed_from_u64(123);
    let geom = Geometry::new(250, 250, 200, 2.0, GeometrySource::Auto);
    let gray = blank_gray(500, 500);

    for _ in 0..100 {
        let candidates: Vec<ScoredDetection> = (0..15).map(|_| random_scored(&mut rng, 500, 500)).collect();

        let mut loose = PipelineConfig::default();
        loose.nms_overlap_threshold = 0.9;
        let mut strict = PipelineConfig::default();
        strict.nms_overlap_threshold = 0.1;

        let (loose_survivors, _) = filter_candidates(&candidates, &geom, &gray, &loose).unwrap();
        let (strict_survivors, _) = filter_candidates(&candidates, &geom, &gray, &strict).unwrap();

        assert!(strict_survivors.len() <= loose_survivors.len());
    }
}
