//! Error types for the detection pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Result type used throughout the pipeline.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that can occur while solving geometry, preprocessing, detecting,
/// filtering, classifying, tracking, or caching a video.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot open or decode video: {0}")]
    DecoderError(String),

    #[error("video not found: {0}")]
    VideoNotFound(PathBuf),

    #[error("frame {0} out of range")]
    FrameNotFound(u64),

    #[error("mask shape ({mask_h}x{mask_w}) does not match frame shape ({frame_h}x{frame_w})")]
    ShapeMismatch {
        mask_h: i32,
        mask_w: i32,
        frame_h: i32,
        frame_w: i32,
    },

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("drum geometry degenerate: radius_px = {0}")]
    GeometryDegenerate(i32),

    #[error("cache I/O failed: {0}")]
    CacheIo(String),

    #[error("processing cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),
}

impl PipelineError {
    pub fn decoder_error(message: impl Into<String>) -> Self {
        Self::DecoderError(message.into())
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::ConfigInvalid(message.into())
    }

    pub fn cache_io(message: impl Into<String>) -> Self {
        Self::CacheIo(message.into())
    }

    /// Exit code for a CLI wrapper, per the external-interfaces contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::VideoNotFound(_) => 1,
            PipelineError::DecoderError(_) => 2,
            PipelineError::CacheIo(_) => 3,
            PipelineError::Cancelled => 4,
            _ => 1,
        }
    }
}
