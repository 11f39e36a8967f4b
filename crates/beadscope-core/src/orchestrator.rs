//! Drives the whole per-frame pipeline: decode, preprocess, detect, score,
//! filter, classify, track, cache — in that fixed order, one frame at a
//! time.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use beadscope_models::{CacheMetadata, FrameDetections, Geometry, VideoCache};

use crate::cache::ResultsCache;
use crate::classify;
use crate::config::PipelineConfig;
use crate::decode::FrameDecoder;
use crate::detect::generate_candidates;
use crate::error::PipelineResult;
use crate::filter::filter_candidates;
use crate::geometry::{solve_drum_geometry, GeometryOverride};
use crate::preprocess::{preprocess, DenoiseMode, GlareMode};
use crate::progress::{ProgressCallback, ProgressEvent};
use crate::score::score_candidates;
use crate::track::Tracker;

/// A caller-settable flag the orchestrator polls before each frame.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options governing one orchestrator run, beyond the fixed stage config.
pub struct RunOptions {
    pub denoise: DenoiseMode,
    pub glare: GlareMode,
    pub geometry_override: GeometryOverride,
    pub frame_limit: Option<u64>,
    pub progress: Option<ProgressCallback>,
    pub cancellation: CancellationToken,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            denoise: DenoiseMode::Bilateral,
            glare: GlareMode::None,
            geometry_override: GeometryOverride::default(),
            frame_limit: None,
            progress: None,
            cancellation: CancellationToken::new(),
        }
    }
}

/// Processes `video_path` end to end, writing results to `cache_path`, and
/// returns the finalised [`VideoCache`].
///
/// Per-frame decoder errors are logged and recorded as an empty
/// [`FrameDetections`]; every other error fails the whole run, leaving the
/// JSONL sibling intact for recovery.
pub fn run(
    video_path: impl AsRef<Path>,
    cache_path: impl AsRef<Path>,
    cfg: &PipelineConfig,
    options: RunOptions,
    created_at: impl Into<String>,
) -> PipelineResult<VideoCache> {
    cfg.validate()?;

    let mut decoder = FrameDecoder::open(video_path.as_ref())?;
    let meta = decoder.metadata();

    let first_frame = decoder.get_frame(0)?;
    let geometry = solve_drum_geometry(&first_frame, cfg, options.geometry_override)?;
    debug!(?geometry, "drum geometry solved");

    let total_expected = options.frame_limit.unwrap_or(meta.total_frames);

    let mut cache = ResultsCache::new(cache_path.as_ref());
    cache.start_processing(
        CacheMetadata {
            video_path: decoder.path().to_string_lossy().into_owned(),
            fps: meta.fps,
            width: meta.width,
            height: meta.height,
            total_frames: meta.total_frames,
            px_per_mm: geometry.px_per_mm,
            drum_center: geometry.center(),
            drum_radius: geometry.radius_px,
            created_at: created_at.into(),
        },
        serde_json::to_value(cfg)?,
    )?;

    let mut tracker = Tracker::new(cfg.tracking.clone());
    let mut next_frame_id = 0u64;

    for result in decoder.iter_frames(0)? {
        if options.cancellation.is_cancelled() {
            if let Some(cb) = &options.progress {
                cb(ProgressEvent::Cancelled);
            }
            break;
        }
        let (frame_id, frame) = match result {
            Ok(v) => v,
            Err(e) => {
                let frame_id = next_frame_id;
                warn!(frame_id, error = %e, "decoder error, recording empty detections");
                if let Some(limit) = options.frame_limit {
                    if frame_id >= limit {
                        break;
                    }
                }
                let timestamp = FrameDetections::timestamp_for(frame_id, meta.fps);
                cache.append_frame(FrameDetections { frame_id, timestamp, balls: Vec::new() })?;
                next_frame_id += 1;
                if let Some(cb) = &options.progress {
                    cb(ProgressEvent::FrameProcessed { frame_id, total: total_expected });
                }
                continue;
            }
        };
        if let Some(limit) = options.frame_limit {
            if frame_id >= limit {
                break;
            }
        }

        let balls = match process_frame(&frame, &geometry, cfg, &options, &mut tracker, frame_id) {
            Ok(balls) => balls,
            Err(e) => {
                warn!(frame_id, error = %e, "frame processing failed, recording empty detections");
                Vec::new()
            }
        };

        let timestamp = FrameDetections::timestamp_for(frame_id, meta.fps);
        cache.append_frame(FrameDetections { frame_id, timestamp, balls })?;
        next_frame_id = frame_id + 1;

        if let Some(cb) = &options.progress {
            cb(ProgressEvent::FrameProcessed { frame_id, total: total_expected });
        }
    }

    cache.finalize()?;
    if let Some(cb) = &options.progress {
        cb(ProgressEvent::Finished);
    }

    ResultsCache::load(cache_path.as_ref())
}

fn process_frame(
    frame: &opencv::core::Mat,
    geometry: &Geometry,
    cfg: &PipelineConfig,
    options: &RunOptions,
    tracker: &mut Tracker,
    frame_id: u64,
) -> PipelineResult<Vec<beadscope_models::Ball>> {
    let (pre, _quality) = preprocess(frame, geometry, cfg, options.denoise, options.glare)?;
    let raw = generate_candidates(&pre, geometry, cfg)?;
    let scored = score_candidates(&raw, &pre, geometry, cfg)?;
    let (filtered, _counters) = filter_candidates(&scored, geometry, &pre, cfg)?;
    let balls = classify::classify(&filtered, geometry.px_per_mm, &cfg.size_bins);

    if cfg.tracking.enabled {
        Ok(tracker.update(frame_id, balls))
    } else {
        Ok(balls)
    }
}
