//! End-to-end scenarios run against the individual stages directly
//! (geometry → preprocess → detect → score → filter → classify → track),
//! without going through the video decoder or cache — a synthetic `Mat`
//! stands in for a decoded frame.

use opencv::core::{Mat, Point, Scalar};
use opencv::imgproc;

use beadscope_core::classify::classify;
use beadscope_core::config::PipelineConfig;
use beadscope_core::detect::generate_candidates;
use beadscope_core::filter::filter_candidates;
use beadscope_core::score::score_candidates;
use beadscope_core::track::Tracker;
use beadscope_models::{FilteredDetection, Geometry, GeometrySource, ScoredDetection, Features};

fn blank(h: i32, w: i32) -> Mat {
    Mat::new_rows_cols_with_default(h, w, opencv::core::CV_8UC3, Scalar::all(0.0)).unwrap()
}

fn to_gray(bgr: &Mat) -> Mat {
    let mut gray = Mat::default();
    imgproc::cvt_color(
        bgr,
        &mut gray,
        imgproc::COLOR_BGR2GRAY,
        0,
        opencv::core::AlgorithmHint::ALGO_HINT_DEFAULT,
    )
    .unwrap();
    gray
}

fn geometry() -> Geometry {
    // 500x500 frame, drum centred at (250,250) radius 200, px_per_mm 2.0.
    Geometry::new(250, 250, 200, 2.0, GeometrySource::Manual)
}

/// E2E-1: a single filled white circle over a black frame should survive
/// detection, scoring, and filtering as exactly one Ball, regardless of
/// which candidate path fires.
#[test]
fn e2e1_synthetic_circle_single_frame() {
    let mut frame = blank(500, 500);
    imgproc::circle(
        &mut frame,
        Point::new(250, 250),
        30,
        Scalar::all(255.0),
        -1,
        imgproc::LINE_8,
        0,
    )
    .unwrap();
    let gray = to_gray(&frame);

    let geom = geometry();
    let cfg = PipelineConfig::default();

    let raw = generate_candidates(&gray, &geom, &cfg).unwrap();
    assert!(!raw.is_empty(), "expected at least one raw candidate near the drawn circle");

    let scored = score_candidates(&raw, &gray, &geom, &cfg).unwrap();
    let (filtered, _counters) = filter_candidates(&scored, &geom, &gray, &cfg).unwrap();

    assert_eq!(filtered.len(), 1, "NMS should collapse duplicate circle candidates to one");
    let det = filtered[0];
    assert!((det.x - 250).abs() <= 2);
    assert!((det.y - 250).abs() <= 2);
    assert!((det.r_px - 30.0).abs() <= 3.0);
    assert!(det.conf >= 0.6);

    let balls = classify(&filtered, geom.px_per_mm, &cfg.size_bins);
    assert_eq!(balls.len(), 1);
    assert!((balls[0].diameter_mm - 30.0).abs() <= 0.5);
    assert_eq!(balls[0].cls, beadscope_models::SizeClass::Unknown);
}

/// E2E-2: a filled rectangle has circularity far below the contour path's
/// threshold, and is too large/non-circular for the Hough path to accept
/// as a clean single circle at the configured radius bounds.
#[test]
fn e2e2_rectangle_rejected_by_contour_path() {
    let mut frame = blank(500, 500);
    imgproc::rectangle(
        &mut frame,
        opencv::core::Rect::new(200, 200, 100, 100),
        Scalar::all(255.0),
        -1,
        imgproc::LINE_8,
        0,
    )
    .unwrap();
    let gray = to_gray(&frame);

    let geom = geometry();
    let cfg = PipelineConfig::default();

    let raw = generate_candidates(&gray, &geom, &cfg).unwrap();
    let from_contour = raw
        .iter()
        .filter(|d| d.source == beadscope_models::RawSource::Contour)
        .count();
    assert_eq!(from_contour, 0, "square contour circularity is well below the 0.65 threshold");
}

/// E2E-3: reclassifying at a new calibration only moves `diameter_mm`/`cls`;
/// detection geometry is untouched.
#[test]
fn e2e3_calibration_reclass() {
    use beadscope_core::classify::reclassify;

    let cfg = PipelineConfig::default();
    let detections = vec![
        FilteredDetection { x: 10, y: 10, r_px: 8.0, conf: 0.9 },
        FilteredDetection { x: 20, y: 20, r_px: 13.0, conf: 0.9 },
        FilteredDetection { x: 30, y: 30, r_px: 20.0, conf: 0.9 },
    ];

    let balls_at_4 = classify(&detections, 4.0, &cfg.size_bins);
    assert_eq!(balls_at_4[0].cls, beadscope_models::SizeClass::Known(4));
    assert_eq!(balls_at_4[1].cls, beadscope_models::SizeClass::Known(6));
    assert_eq!(balls_at_4[2].cls, beadscope_models::SizeClass::Known(10));

    let balls_at_2 = reclassify(&balls_at_4, 2.0, &cfg.size_bins);
    assert_eq!(balls_at_2[0].cls, beadscope_models::SizeClass::Unknown);
    assert_eq!(balls_at_2[1].cls, beadscope_models::SizeClass::Unknown);
    assert_eq!(balls_at_2[2].cls, beadscope_models::SizeClass::Unknown);

    for (a, b) in balls_at_4.iter().zip(balls_at_2.iter()) {
        assert_eq!(a.x, b.x);
        assert_eq!(a.y, b.y);
        assert_eq!(a.r_px, b.r_px);
        assert_eq!(a.conf, b.conf);
    }
}

fn scored(x: i32, y: i32, r_px: f64, conf: f64) -> ScoredDetection {
    ScoredDetection {
        x,
        y,
        r_px,
        conf,
        features: Features { edge_strength: conf, circularity: conf, interior: conf, radius_fit: conf },
    }
}

/// E2E-4: a candidate outside the inner (rim-margin-shrunk) drum circle is
/// dropped by the rim-margin filter stage.
#[test]
fn e2e4_rim_rejection() {
    let geom = geometry();
    let cfg = PipelineConfig::default();
    let gray = to_gray(&blank(500, 500));

    let candidate = scored(445, 250, 10.0, 0.9);
    let (filtered, counters) = filter_candidates(&[candidate], &geom, &gray, &cfg).unwrap();

    assert_eq!(counters.input, 1);
    assert_eq!(counters.after_rim_margin, 0);
    assert!(filtered.is_empty());
}

/// E2E-5: of two overlapping candidates, only the higher-confidence one
/// survives NMS.
#[test]
fn e2e5_nms_pair() {
    let geom = geometry();
    let cfg = PipelineConfig::default();
    let mut frame = blank(500, 500);
    imgproc::circle(&mut frame, Point::new(250, 250), 30, Scalar::all(200.0), -1, imgproc::LINE_8, 0).unwrap();
    let gray = to_gray(&frame);

    let candidates = [scored(250, 250, 30.0, 0.8), scored(255, 255, 28.0, 0.6)];
    let (filtered, _counters) = filter_candidates(&candidates, &geom, &gray, &cfg).unwrap();

    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].x, 250);
    assert_eq!(filtered[0].y, 250);
}

/// E2E-6: a track survives a two-frame gap within `max_lost_frames`.
#[test]
fn e2e6_tracker_continuity_across_gap() {
    let cfg = beadscope_core::config::TrackingConfig::default();
    let mut tracker = Tracker::new(cfg);

    let mk = |x: i32, y: i32| beadscope_models::Ball {
        x,
        y,
        r_px: 20.0,
        diameter_mm: 10.0,
        cls: beadscope_models::SizeClass::Known(6),
        conf: 0.9,
        track_id: None,
    };

    let f0 = tracker.update(0, vec![mk(100, 100)]);
    let _f1 = tracker.update(1, vec![mk(103, 101)]);
    let _f2 = tracker.update(2, vec![]);
    let f3 = tracker.update(3, vec![mk(106, 102)]);

    assert_eq!(f0[0].track_id, Some(1));
    assert_eq!(f3[0].track_id, Some(1));
}
