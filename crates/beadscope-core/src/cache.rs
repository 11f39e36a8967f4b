//! Hybrid append-then-finalise results cache.
//!
//! Processing streams one JSON line per frame into a `.jsonl` sibling,
//! flushing after every write, so a crash mid-run still leaves a valid,
//! loadable prefix. `finalise` folds the buffered frames into a single
//! structured document and removes the JSONL. A small `.meta.json`
//! sidecar carries metadata/config alongside the JSONL, since metadata is
//! not itself one of the per-frame lines — without it a JSONL-only
//! recovery would have nowhere to read `fps`/`px_per_mm`/etc from.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;

use beadscope_models::{CacheMetadata, FrameDetections, VideoCache};

use crate::error::{PipelineError, PipelineResult};

pub struct ResultsCache {
    target_path: PathBuf,
    jsonl_path: PathBuf,
    meta_path: PathBuf,
    writer: Option<File>,
    metadata: Option<CacheMetadata>,
    config: Value,
    frames: std::collections::BTreeMap<u64, FrameDetections>,
}

impl ResultsCache {
    pub fn new(target_path: impl Into<PathBuf>) -> Self {
        let target_path = target_path.into();
        let jsonl_path = sibling_with_extension(&target_path, "jsonl");
        let meta_path = sibling_with_extension(&target_path, "meta.json");
        Self {
            target_path,
            jsonl_path,
            meta_path,
            writer: None,
            metadata: None,
            config: Value::Null,
            frames: std::collections::BTreeMap::new(),
        }
    }

    /// Opens the JSONL sibling for streaming writes and records metadata.
    pub fn start_processing(&mut self, metadata: CacheMetadata, config: Value) -> PipelineResult<()> {
        let file = File::create(&self.jsonl_path).map_err(|e| {
            PipelineError::cache_io(format!("cannot create {}: {e}", self.jsonl_path.display()))
        })?;
        self.writer = Some(file);
        self.frames.clear();

        let sidecar = serde_json::json!({ "metadata": &metadata, "config": &config });
        fs::write(&self.meta_path, serde_json::to_vec_pretty(&sidecar)?).map_err(|e| {
            PipelineError::cache_io(format!("cannot write {}: {e}", self.meta_path.display()))
        })?;

        self.metadata = Some(metadata);
        self.config = config;
        Ok(())
    }

    /// Appends one frame as a JSONL line, flushing immediately so the file
    /// stays a valid prefix if the process dies right after this call.
    pub fn append_frame(&mut self, fd: FrameDetections) -> PipelineResult<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| PipelineError::cache_io("append_frame called before start_processing"))?;

        let mut line = serde_json::to_vec(&fd)?;
        line.push(b'\n');
        writer
            .write_all(&line)
            .and_then(|_| writer.flush())
            .map_err(|e| PipelineError::cache_io(format!("write to jsonl failed: {e}")))?;

        self.frames.insert(fd.frame_id, fd);
        Ok(())
    }

    /// Writes the structured document and removes the JSONL sibling. The
    /// meta sidecar is removed too; its only purpose was JSONL-fallback
    /// recovery.
    pub fn finalize(&mut self) -> PipelineResult<()> {
        let metadata = self
            .metadata
            .clone()
            .ok_or_else(|| PipelineError::cache_io("finalize called before start_processing"))?;

        let mut cache = VideoCache::new(metadata, self.config.clone());
        cache.frames = self.frames.clone();

        let json = serde_json::to_vec_pretty(&cache)?;
        fs::write(&self.target_path, json).map_err(|e| {
            PipelineError::cache_io(format!("cannot write {}: {e}", self.target_path.display()))
        })?;

        self.writer = None;
        let _ = fs::remove_file(&self.jsonl_path);
        let _ = fs::remove_file(&self.meta_path);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.target_path.exists()
    }

    pub fn metadata(&self) -> Option<&CacheMetadata> {
        self.metadata.as_ref()
    }

    pub fn get_frame(&self, frame_id: u64) -> FrameDetections {
        self.frames
            .get(&frame_id)
            .cloned()
            .unwrap_or_else(|| FrameDetections::empty(frame_id, 0.0))
    }

    pub fn frame_ids(&self) -> Vec<u64> {
        self.frames.keys().copied().collect()
    }

    /// Loads a cache from disk: structured file first, JSONL-plus-sidecar
    /// fallback second. Missing frames on either path are never an error —
    /// callers treat the cache as sparse.
    pub fn load(target_path: impl Into<PathBuf>) -> PipelineResult<VideoCache> {
        let target_path = target_path.into();
        if target_path.exists() {
            return load_structured(&target_path);
        }

        let jsonl_path = sibling_with_extension(&target_path, "jsonl");
        let meta_path = sibling_with_extension(&target_path, "meta.json");
        if jsonl_path.exists() {
            return load_jsonl(&jsonl_path, &meta_path);
        }

        Err(PipelineError::cache_io(format!(
            "no cache found at {} or {}",
            target_path.display(),
            jsonl_path.display()
        )))
    }
}

fn load_structured(path: &Path) -> PipelineResult<VideoCache> {
    let bytes = fs::read(path)
        .map_err(|e| PipelineError::cache_io(format!("cannot read {}: {e}", path.display())))?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn load_jsonl(jsonl_path: &Path, meta_path: &Path) -> PipelineResult<VideoCache> {
    let (metadata, config) = if meta_path.exists() {
        let bytes = fs::read(meta_path)
            .map_err(|e| PipelineError::cache_io(format!("cannot read {}: {e}", meta_path.display())))?;
        let sidecar: Value = serde_json::from_slice(&bytes)?;
        let metadata: CacheMetadata = serde_json::from_value(sidecar["metadata"].clone())?;
        (metadata, sidecar["config"].clone())
    } else {
        (
            CacheMetadata {
                video_path: String::new(),
                fps: 0.0,
                width: 0,
                height: 0,
                total_frames: 0,
                px_per_mm: 0.0,
                drum_center: (0, 0),
                drum_radius: 0,
                created_at: String::new(),
            },
            Value::Null,
        )
    };

    let mut cache = VideoCache::new(metadata, config);

    let file = File::open(jsonl_path)
        .map_err(|e| PipelineError::cache_io(format!("cannot read {}: {e}", jsonl_path.display())))?;
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| PipelineError::cache_io(format!("jsonl read failed: {e}")))?;
        if line.trim().is_empty() {
            continue;
        }
        let fd: FrameDetections = serde_json::from_str(&line)?;
        cache.frames.insert(fd.frame_id, fd);
    }
    Ok(cache)
}

fn sibling_with_extension(path: &Path, ext: &str) -> PathBuf {
    let mut new_path = path.to_path_buf();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    new_path.set_file_name(format!("{file_name}.{ext}"));
    new_path
}

#[cfg(test)]
mod tests {
    use super::*;
    use beadscope_models::Ball;
    use tempfile::tempdir;

    fn metadata() -> CacheMetadata {
        CacheMetadata {
            video_path: "drum.mp4".into(),
            fps: 30.0,
            width: 1920,
            height: 1080,
            total_frames: 100,
            px_per_mm: 4.0,
            drum_center: (960, 540),
            drum_radius: 800,
            created_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    fn ball() -> Ball {
        Ball {
            x: 10,
            y: 20,
            r_px: 8.0,
            diameter_mm: 4.0,
            cls: beadscope_models::SizeClass::Known(4),
            conf: 0.9,
            track_id: Some(1),
        }
    }

    #[test]
    fn finalize_then_load_round_trips_frames() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("results.json");

        let mut cache = ResultsCache::new(&target);
        cache.start_processing(metadata(), Value::Null).unwrap();
        cache
            .append_frame(FrameDetections { frame_id: 0, timestamp: 0.0, balls: vec![ball()] })
            .unwrap();
        cache
            .append_frame(FrameDetections { frame_id: 1, timestamp: 0.033, balls: vec![] })
            .unwrap();
        cache.finalize().unwrap();

        assert!(target.exists());
        assert!(!sibling_with_extension(&target, "jsonl").exists());

        let loaded = ResultsCache::load(&target).unwrap();
        assert_eq!(loaded.metadata, metadata());
        assert_eq!(loaded.get_frame(0).balls.len(), 1);
        assert!(loaded.get_frame(1).balls.is_empty());
        assert!(loaded.get_frame(99).balls.is_empty());
    }

    #[test]
    fn jsonl_survives_as_recoverable_prefix_without_finalize() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("results.json");

        let mut cache = ResultsCache::new(&target);
        cache.start_processing(metadata(), Value::Null).unwrap();
        cache
            .append_frame(FrameDetections { frame_id: 0, timestamp: 0.0, balls: vec![ball()] })
            .unwrap();
        // Simulate a crash: never call finalize().
        drop(cache);

        assert!(!target.exists());
        let recovered = ResultsCache::load(&target).unwrap();
        assert_eq!(recovered.metadata.fps, 30.0);
        assert_eq!(recovered.get_frame(0).balls.len(), 1);
    }
}
