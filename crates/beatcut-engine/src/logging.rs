//! Structured run logging.
//!
//! Every pipeline event carries the run id and the stage it belongs to.

use beatcut_models::RunId;
use tracing::{error, info, warn, Span};

/// Logger for the lifecycle of one assembly run.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
    video: String,
}

impl RunLogger {
    /// Create a logger for a run over `video`.
    pub fn new(run_id: &RunId, video: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            video: video.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(run_id = %self.run_id, video = %self.video, "Run started: {}", message);
    }

    /// Log the completion of a pipeline stage.
    pub fn log_stage(&self, stage: &str, message: &str) {
        info!(run_id = %self.run_id, stage, "Stage done: {}", message);
    }

    pub fn log_warning(&self, stage: &str, message: &str) {
        warn!(run_id = %self.run_id, stage, "Run warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(run_id = %self.run_id, video = %self.video, "Run error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(run_id = %self.run_id, video = %self.video, "Run completed: {}", message);
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Span covering the whole run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("run", run_id = %self.run_id, video = %self.video)
    }
}
