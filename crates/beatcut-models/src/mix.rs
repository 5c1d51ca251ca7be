//! Background music layer of the final mix.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How the background track is laid under the composite timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundLayer {
    /// Background track file
    pub path: PathBuf,
    /// Duration of one play of the track, in seconds
    pub source_duration: f64,
    /// Number of back-to-back plays needed to cover the timeline
    pub plays: u32,
    /// Final length, equal to the timeline duration
    pub duration: f64,
    /// Fade-in at the absolute start
    pub fade_in: f64,
    /// Fade-out ending at the absolute end
    pub fade_out: f64,
    /// Linear gain relative to the speech layer
    pub gain: f64,
}

impl BackgroundLayer {
    /// Whether the track has to be repeated.
    pub fn is_looped(&self) -> bool {
        self.plays > 1
    }

    /// Start of the fade-out on the output timeline.
    pub fn fade_out_start(&self) -> f64 {
        (self.duration - self.fade_out).max(0.0)
    }
}
