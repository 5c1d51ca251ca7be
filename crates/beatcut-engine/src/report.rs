//! Human-readable status report for a finished run.

use std::path::PathBuf;

use beatcut_models::{CompositeTimeline, EffectFailure, RunId, Transition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a successful run produced and how it got there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    /// Rendered file, absent for plan-only runs
    pub artifact: Option<PathBuf>,
    pub background_track: PathBuf,
    /// Mood summary used for music retrieval
    pub mood_summary: String,
    pub shot_count: usize,
    pub transitions: Vec<Transition>,
    pub total_duration_secs: f64,
    pub beat_count: usize,
    /// Per-shot fallbacks, including skipped shots
    pub fallbacks: Vec<EffectFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Build a report from a composed timeline.
    pub fn from_timeline(
        timeline: &CompositeTimeline,
        background_track: PathBuf,
        mood_summary: impl Into<String>,
        beat_count: usize,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: timeline.run_id.clone(),
            artifact: None,
            background_track,
            mood_summary: mood_summary.into(),
            shot_count: timeline.segments.len(),
            transitions: timeline.segments.iter().skip(1).map(|s| s.transition).collect(),
            total_duration_secs: timeline.total_duration,
            beat_count,
            fallbacks: timeline.failures().cloned().collect(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn with_artifact(mut self, artifact: PathBuf) -> Self {
        self.artifact = Some(artifact);
        self
    }

    /// Wall-clock run time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// Status text naming the background track and the mood summary.
    pub fn summary(&self) -> String {
        let track = self
            .background_track
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.background_track.display().to_string());

        let mut text = format!("Success.\nBackground: {}\nSummary: {}", track, self.mood_summary);
        for failure in &self.fallbacks {
            text.push_str(&format!(
                "\nShot {}: {} ({})",
                failure.shot_index,
                failure.kind.as_str(),
                failure.message
            ));
        }
        text
    }
}
