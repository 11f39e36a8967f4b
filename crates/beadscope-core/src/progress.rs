//! Progress reporting type shared between the orchestrator and its caller.

use std::sync::Arc;

/// Events the orchestrator announces as a run proceeds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressEvent {
    FrameProcessed { frame_id: u64, total: u64 },
    Finished,
    Cancelled,
}

/// Caller-supplied sink for [`ProgressEvent`]s. Must not re-enter the
/// orchestrator.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
