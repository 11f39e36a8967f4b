//! On-disk cache schema: metadata plus a sparse map of frame detections.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ball::FrameDetections;

/// Current cache schema version, written to every structured cache file.
pub const CACHE_SCHEMA_VERSION: &str = "2.0";

/// Video- and calibration-level metadata captured once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub video_path: String,
    pub fps: f64,
    pub width: i32,
    pub height: i32,
    pub total_frames: u64,
    pub px_per_mm: f64,
    pub drum_center: (i32, i32),
    pub drum_radius: i32,
    pub created_at: String,
}

/// The full structured cache document: `{version, metadata, config, frames}`.
///
/// `frames` is keyed by frame id but serialised with string keys per the
/// wire format; `config` is kept as an opaque JSON value here since its
/// shape is owned by `beadscope-core`'s `PipelineConfig` and this crate
/// must not depend on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoCache {
    pub version: String,
    pub metadata: CacheMetadata,
    #[serde(default)]
    pub config: Value,
    #[serde(with = "frame_map")]
    pub frames: BTreeMap<u64, FrameDetections>,
}

impl VideoCache {
    pub fn new(metadata: CacheMetadata, config: Value) -> Self {
        Self {
            version: CACHE_SCHEMA_VERSION.to_string(),
            metadata,
            config,
            frames: BTreeMap::new(),
        }
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
}

/// `frames` is a JSON object keyed by decimal frame id strings, not an
/// array, so round-tripping needs a small custom (de)serializer.
mod frame_map {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use crate::ball::FrameDetections;

    pub fn serialize<S>(
        map: &BTreeMap<u64, FrameDetections>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeMap;
        let mut out = serializer.serialize_map(Some(map.len()))?;
        for (k, v) in map {
            out.serialize_entry(&k.to_string(), v)?;
        }
        out.end()
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<BTreeMap<u64, FrameDetections>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: BTreeMap<String, FrameDetections> =
            BTreeMap::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(k, v)| {
                k.parse::<u64>()
                    .map(|id| (id, v))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}
