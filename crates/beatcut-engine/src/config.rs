//! Assembly configuration.
//!
//! Every threshold and duration used by the engine lives here with its
//! default. Values load from a JSON file (missing fields keep their
//! defaults) and can be overridden with `BEATCUT_*` environment variables.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use beatcut_media::{BeatTrackingConfig, RenderConfig, SegmenterConfig};

use crate::error::{AssemblyError, AssemblyResult};

/// Per-shot trim settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimConfig {
    /// Correlation below which a frame counts as an internal change.
    pub change_threshold: f64,
    /// Changes earlier than this (from the shot start) are ignored.
    pub min_change_gap_secs: f64,
    /// Ceiling on the kept duration of shots without speech.
    pub max_duration_secs: f64,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            change_threshold: 0.85,
            min_change_gap_secs: 1.0,
            max_duration_secs: 5.0,
        }
    }
}

impl TrimConfig {
    pub fn with_max_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }
}

/// Transition decision thresholds and durations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    /// Scene similarity below this picks a slide/zoom.
    pub distinct_scene_below: f64,
    /// Scene similarity from this up allows mood transitions and cuts.
    pub similar_scene_from: f64,
    /// Mood similarity below this picks fade-to-black or glitch.
    pub mood_shift_below: f64,
    pub slide_secs: f64,
    pub crossfade_secs: f64,
    pub mood_secs: f64,
    /// Mood substring that selects fade-to-black over glitch.
    pub sad_token: String,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            distinct_scene_below: 0.4,
            similar_scene_from: 0.7,
            mood_shift_below: 0.5,
            slide_secs: 0.6,
            crossfade_secs: 0.5,
            mood_secs: 0.4,
            sad_token: "sad".to_string(),
        }
    }
}

/// Beat snapping bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatSyncConfig {
    /// Beats closer than this to the cursor are never chosen.
    pub min_lead_secs: f64,
    pub min_speed: f64,
    pub max_speed: f64,
}

impl Default for BeatSyncConfig {
    fn default() -> Self {
        Self {
            min_lead_secs: 0.5,
            min_speed: 0.5,
            max_speed: 2.0,
        }
    }
}

impl BeatSyncConfig {
    /// Whether a speed factor is allowed.
    pub fn accepts(&self, speed: f64) -> bool {
        speed.is_finite() && speed >= self.min_speed && speed <= self.max_speed
    }
}

/// Speech isolation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Fade applied at both ends of each kept speech window.
    pub fade_secs: f64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self { fade_secs: 0.1 }
    }
}

/// Timeline placement settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Fade-out applied where a segment's speech is cut by the next segment.
    pub handoff_fade_secs: f64,
    /// Source/slot length mismatch tolerated without a speed change.
    pub speed_tolerance_secs: f64,
    /// Slots shorter than this are never sped.
    pub min_speed_adjust_secs: f64,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            handoff_fade_secs: 0.05,
            speed_tolerance_secs: 0.05,
            min_speed_adjust_secs: 0.1,
        }
    }
}

/// Background layer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixConfig {
    pub fade_secs: f64,
    /// Linear gain of the background relative to speech.
    pub background_gain: f64,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            fade_secs: 1.0,
            background_gain: 0.3,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    pub segmenter: SegmenterConfig,
    pub trim: TrimConfig,
    pub transitions: TransitionConfig,
    pub beat_sync: BeatSyncConfig,
    pub speech: SpeechConfig,
    pub compositor: CompositorConfig,
    pub mix: MixConfig,
    pub beat_tracking: BeatTrackingConfig,
    pub render: RenderConfig,
}

impl AssemblyConfig {
    /// Load from a JSON file.
    pub fn from_file(path: &Path) -> AssemblyResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AssemblyError::config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Defaults with `BEATCUT_*` environment overrides.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `BEATCUT_*` overrides read through `lookup`. Unparseable values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|v| v.trim().parse().ok())
        }

        if let Some(v) = parse(&lookup, "BEATCUT_SHOT_THRESHOLD") {
            self.segmenter.threshold = v;
        }
        if let Some(v) = parse(&lookup, "BEATCUT_DEFAULT_FPS") {
            self.segmenter.default_fps = v;
        }
        if let Some(v) = parse(&lookup, "BEATCUT_TRIM_CHANGE_THRESHOLD") {
            self.trim.change_threshold = v;
        }
        if let Some(v) = parse(&lookup, "BEATCUT_TRIM_MAX_SECS") {
            self.trim.max_duration_secs = v;
        }
        if let Some(v) = parse(&lookup, "BEATCUT_MIN_SPEED") {
            self.beat_sync.min_speed = v;
        }
        if let Some(v) = parse(&lookup, "BEATCUT_MAX_SPEED") {
            self.beat_sync.max_speed = v;
        }
        if let Some(v) = parse(&lookup, "BEATCUT_BGM_GAIN") {
            self.mix.background_gain = v;
        }
        if let Some(v) = parse(&lookup, "BEATCUT_BGM_FADE_SECS") {
            self.mix.fade_secs = v;
        }
        if let Some(v) = parse(&lookup, "BEATCUT_BEAT_WINDOW_SECS") {
            self.beat_tracking.analysis_window_secs = v;
        }
        if let Some(v) = parse(&lookup, "BEATCUT_RENDER_CRF") {
            self.render.crf = v;
        }
        if let Some(v) = lookup("BEATCUT_RENDER_PRESET").filter(|v| !v.trim().is_empty()) {
            self.render.preset = v.trim().to_string();
        }
        if let Some(v) = parse(&lookup, "BEATCUT_RENDER_TIMEOUT_SECS") {
            self.render.timeout_secs = Some(v);
        }

        self
    }

    /// Reject settings the engine cannot honour.
    pub fn validate(&self) -> AssemblyResult<()> {
        fn check(ok: bool, msg: &str) -> AssemblyResult<()> {
            if ok {
                Ok(())
            } else {
                Err(AssemblyError::config(msg))
            }
        }

        let s = &self.segmenter;
        check(s.threshold.is_finite(), "segmenter.threshold must be finite")?;
        check(s.default_fps > 0.0, "segmenter.default_fps must be positive")?;
        check(s.hue_bins > 0, "segmenter.hue_bins must be positive")?;
        check(
            s.frame_width > 0 && s.frame_height > 0,
            "segmenter frame size must be non-zero",
        )?;

        let t = &self.trim;
        check(t.max_duration_secs > 0.0, "trim.max_duration_secs must be positive")?;
        check(t.min_change_gap_secs >= 0.0, "trim.min_change_gap_secs must not be negative")?;

        let tr = &self.transitions;
        check(
            tr.distinct_scene_below <= tr.similar_scene_from,
            "transitions.distinct_scene_below must not exceed similar_scene_from",
        )?;
        check(
            tr.slide_secs >= 0.0 && tr.crossfade_secs >= 0.0 && tr.mood_secs >= 0.0,
            "transition durations must not be negative",
        )?;

        let b = &self.beat_sync;
        check(b.min_speed > 0.0, "beat_sync.min_speed must be positive")?;
        check(
            b.min_speed <= 1.0 && b.max_speed >= 1.0,
            "beat_sync speed range must include 1.0",
        )?;
        check(b.min_lead_secs >= 0.0, "beat_sync.min_lead_secs must not be negative")?;

        check(self.speech.fade_secs >= 0.0, "speech.fade_secs must not be negative")?;

        let c = &self.compositor;
        check(
            c.handoff_fade_secs >= 0.0 && c.speed_tolerance_secs >= 0.0 && c.min_speed_adjust_secs >= 0.0,
            "compositor values must not be negative",
        )?;

        check(self.mix.fade_secs >= 0.0, "mix.fade_secs must not be negative")?;
        check(self.mix.background_gain >= 0.0, "mix.background_gain must not be negative")?;

        let bt = &self.beat_tracking;
        check(bt.sample_rate > 0, "beat_tracking.sample_rate must be positive")?;
        check(
            bt.analysis_window_secs > 0.0,
            "beat_tracking.analysis_window_secs must be positive",
        )?;
        check(
            bt.min_bpm > 0.0 && bt.min_bpm < bt.max_bpm,
            "beat_tracking bpm range is empty",
        )?;

        check(self.render.crf <= 51, "render.crf must be at most 51")?;

        Ok(())
    }
}
