//! Shared data models for the bead detection pipeline.
//!
//! This crate holds pure data types with no OpenCV dependency and no
//! algorithmic behaviour: detections at each pipeline stage, the classified
//! `Ball`, per-frame and per-video containers, and the on-disk cache
//! schema. Conversions between stages live in `beadscope-core`; this crate
//! only describes their shapes.

pub mod ball;
pub mod bins;
pub mod cache;
pub mod detection;
pub mod geometry;

pub use ball::{Ball, FrameDetections};
pub use bins::{SizeBin, SizeClass};
pub use cache::{CacheMetadata, VideoCache};
pub use detection::{Features, FilteredDetection, RawDetection, RawSource, ScoredDetection};
pub use geometry::{Geometry, GeometrySource};
