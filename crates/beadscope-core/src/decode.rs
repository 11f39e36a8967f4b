//! Sequential and seek-based frame delivery with rotation normalisation.
//!
//! Built on `opencv::videoio::VideoCapture`, the teacher's only video-I/O
//! dependency. `frame_id` tracks `CAP_PROP_POS_FRAMES`, not a counter kept
//! on this side, so a seek followed by iteration stays frame-accurate even
//! across codecs that round PTS differently.

use std::path::{Path, PathBuf};

use opencv::core::Mat;
use opencv::prelude::*;
use opencv::{imgproc, videoio};

use crate::error::{PipelineError, PipelineResult};

/// Static facts about the opened container, read once at open time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMetadata {
    pub width: i32,
    pub height: i32,
    pub fps: f64,
    pub total_frames: u64,
    pub duration_s: f64,
    pub rotation_deg: i32,
}

pub struct FrameDecoder {
    capture: videoio::VideoCapture,
    metadata: FrameMetadata,
    path: PathBuf,
}

impl FrameDecoder {
    /// Opens `path` with `CAP_ANY`, reading rotation metadata where the
    /// backend exposes it. Width/height in the returned metadata reflect
    /// the *rotated* frame, since every later stage sees upright pixels.
    pub fn open(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::VideoNotFound(path.to_path_buf()));
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| PipelineError::decoder_error("video path is not valid UTF-8"))?;

        let mut capture = videoio::VideoCapture::from_file(path_str, videoio::CAP_ANY)?;
        if !videoio::VideoCapture::is_opened(&capture)? {
            return Err(PipelineError::decoder_error(format!(
                "could not open video: {}",
                path.display()
            )));
        }

        let raw_width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let raw_height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32;
        let fps = capture.get(videoio::CAP_PROP_FPS)?;
        let total_frames = capture.get(videoio::CAP_PROP_FRAME_COUNT)?.max(0.0) as u64;

        let rotation_deg = normalize_rotation(
            capture
                .get(videoio::CAP_PROP_ORIENTATION_META)
                .unwrap_or(0.0) as i32,
        );

        let (width, height) = if rotation_deg == 90 || rotation_deg == 270 {
            (raw_height, raw_width)
        } else {
            (raw_width, raw_height)
        };

        let duration_s = if fps > 0.0 {
            total_frames as f64 / fps
        } else {
            0.0
        };

        Ok(Self {
            capture,
            metadata: FrameMetadata {
                width,
                height,
                fps,
                total_frames,
                duration_s,
                rotation_deg,
            },
            path: path.to_path_buf(),
        })
    }

    pub fn metadata(&self) -> FrameMetadata {
        self.metadata
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Seeks to `start_frame` and returns a finite, non-restartable
    /// iterator over `(frame_id, upright_bgr_frame)`.
    pub fn iter_frames(&mut self, start_frame: u64) -> PipelineResult<FrameIter<'_>> {
        self.capture
            .set(videoio::CAP_PROP_POS_FRAMES, start_frame as f64)?;
        Ok(FrameIter { decoder: self })
    }

    /// Seeks to and decodes a single frame. Returns `FrameNotFound` if the
    /// container has no frame at or after `frame_id`.
    pub fn get_frame(&mut self, frame_id: u64) -> PipelineResult<Mat> {
        self.capture
            .set(videoio::CAP_PROP_POS_FRAMES, frame_id as f64)?;
        let mut raw = Mat::default();
        if !self.capture.read(&mut raw)? || raw.empty() {
            return Err(PipelineError::FrameNotFound(frame_id));
        }
        rotate(&raw, self.metadata.rotation_deg)
    }

    pub fn close(self) {
        // VideoCapture releases its backend on drop; explicit for symmetry
        // with the distilled decoder contract.
        drop(self.capture);
    }
}

pub struct FrameIter<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for FrameIter<'_> {
    type Item = PipelineResult<(u64, Mat)>;

    fn next(&mut self) -> Option<Self::Item> {
        let pos = match self.decoder.capture.get(videoio::CAP_PROP_POS_FRAMES) {
            Ok(p) => p.max(0.0) as u64,
            Err(e) => return Some(Err(e.into())),
        };

        let mut raw = Mat::default();
        match self.decoder.capture.read(&mut raw) {
            Ok(true) if !raw.empty() => {}
            Ok(_) => return None,
            Err(e) => return Some(Err(e.into())),
        }

        match rotate(&raw, self.decoder.metadata.rotation_deg) {
            Ok(upright) => Some(Ok((pos, upright))),
            Err(e) => Some(Err(e)),
        }
    }
}

fn normalize_rotation(raw_deg: i32) -> i32 {
    let normalized = raw_deg.rem_euclid(360);
    match normalized {
        0..=44 | 316..=360 => 0,
        45..=134 => 90,
        135..=224 => 180,
        _ => 270,
    }
}

fn rotate(frame: &Mat, rotation_deg: i32) -> PipelineResult<Mat> {
    let code = match rotation_deg {
        90 => Some(imgproc::ROTATE_90_CLOCKWISE),
        180 => Some(imgproc::ROTATE_180),
        270 => Some(imgproc::ROTATE_90_COUNTERCLOCKWISE),
        _ => None,
    };
    match code {
        Some(code) => {
            let mut rotated = Mat::default();
            opencv::core::rotate(frame, &mut rotated, code)?;
            Ok(rotated)
        }
        None => Ok(frame.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_rotation_snaps_to_quarter_turns() {
        assert_eq!(normalize_rotation(0), 0);
        assert_eq!(normalize_rotation(91), 90);
        assert_eq!(normalize_rotation(178), 180);
        assert_eq!(normalize_rotation(269), 270);
        assert_eq!(normalize_rotation(359), 0);
    }
}
