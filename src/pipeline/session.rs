//! The active job of an interactive session.

use crate::pipeline::orchestrator::{JobHandle, Pipeline};
use crate::pipeline::types::TranscriptionJob;
use tokio_util::sync::CancellationToken;

/// Owns "the current job": submitting a new one cancels the previous one
/// before the new one starts.
pub struct Session {
    pipeline: Pipeline,
    active: Option<CancellationToken>,
}

impl Session {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            active: None,
        }
    }

    /// Cancel any active job, then start `job`.
    pub fn submit(&mut self, job: TranscriptionJob) -> JobHandle {
        self.cancel_active();
        let handle = self.pipeline.start(job);
        self.active = Some(handle.cancel_token());
        handle
    }

    /// Cancel the active job, if any. Returns whether one was running.
    pub fn cancel_active(&mut self) -> bool {
        match self.active.take() {
            Some(token) if !token.is_cancelled() => {
                tracing::debug!("cancelling previous job");
                token.cancel();
                true
            }
            _ => false,
        }
    }
}
