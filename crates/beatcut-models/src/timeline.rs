//! Placed segments and the composite timeline.
//!
//! Times inside a [`TimelineSegment`] come in two flavors:
//! - `trimmed` is in source-video seconds
//! - `placed_start` and the speech clips are in output seconds

use serde::{Deserialize, Serialize};

use crate::run::RunId;
use crate::shot::ShotSpan;
use crate::transition::Transition;

/// Tolerance used when comparing output times.
pub const TIME_EPSILON: f64 = 1e-6;

/// A `[start, end)` interval of the source video, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub start: f64,
    pub end: f64,
}

impl TimeSpan {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// An audible speech window inside a segment.
///
/// `start`/`end` are relative to the segment's placed start, in output
/// seconds. Everything outside the clips of a segment is silent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeechClip {
    pub start: f64,
    pub end: f64,
    pub fade_in: f64,
    pub fade_out: f64,
}

impl SpeechClip {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Why a per-shot effect fell back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectFailureKind {
    /// Required speed change was outside the allowed range; clip left unsped
    SpeedOutOfRange,
    /// Leading transition was longer than the previous segment
    TransitionClamped,
    /// Nothing left of the shot inside the source; shot skipped
    EmptySourceSpan,
}

impl EffectFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectFailureKind::SpeedOutOfRange => "speed_out_of_range",
            EffectFailureKind::TransitionClamped => "transition_clamped",
            EffectFailureKind::EmptySourceSpan => "empty_source_span",
        }
    }
}

/// A recorded per-shot fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectFailure {
    /// Index of the shot in the tagged shot list
    pub shot_index: usize,
    pub kind: EffectFailureKind,
    pub message: String,
}

impl EffectFailure {
    pub fn new(shot_index: usize, kind: EffectFailureKind, message: impl Into<String>) -> Self {
        Self {
            shot_index,
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for EffectFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "shot {}: {} ({})", self.shot_index, self.kind.as_str(), self.message)
    }
}

/// One shot placed on the output timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSegment {
    /// Per-run placement order, starting at 0
    pub sequence: u32,
    /// Index of the shot in the tagged shot list
    pub shot_index: usize,
    /// The source shot
    pub source_shot: ShotSpan,
    /// Portion of the source used, in source seconds
    pub trimmed: TimeSpan,
    /// Absolute start on the output timeline
    pub placed_start: f64,
    /// Transition blending this segment with the previous one
    pub transition: Transition,
    /// Playback speed (source seconds per output second)
    pub speed_factor: f64,
    /// Beat-synchronized duration excluding the leading transition
    pub net_duration: f64,
    /// Audible speech windows
    pub speech: Vec<SpeechClip>,
    /// Effects that fell back for this shot
    pub failures: Vec<EffectFailure>,
}

impl TimelineSegment {
    /// Duration on the output timeline.
    pub fn duration(&self) -> f64 {
        if self.speed_factor > 0.0 {
            self.trimmed.duration() / self.speed_factor
        } else {
            self.trimmed.duration()
        }
    }

    /// Absolute end on the output timeline.
    pub fn placed_end(&self) -> f64 {
        self.placed_start + self.duration()
    }

    /// Absolute output windows during which this segment's speech is audible.
    pub fn audible_windows(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.speech
            .iter()
            .filter(|clip| clip.duration() > 0.0)
            .map(|clip| (self.placed_start + clip.start, self.placed_start + clip.end))
    }

    /// Map a segment-relative output time to source seconds.
    pub fn source_time(&self, relative: f64) -> f64 {
        self.trimmed.start + relative * self.speed_factor
    }
}

/// The final ordered arrangement of placed segments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeTimeline {
    pub run_id: RunId,
    pub segments: Vec<TimelineSegment>,
    /// End of the last placed segment
    pub total_duration: f64,
    /// Shots that could not be placed at all
    #[serde(default)]
    pub skipped: Vec<EffectFailure>,
}

impl CompositeTimeline {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Visual overlap between each pair of consecutive segments.
    pub fn overlaps(&self) -> Vec<f64> {
        self.segments
            .windows(2)
            .map(|pair| pair[0].placed_end() - pair[1].placed_start)
            .collect()
    }

    /// First pair of segments whose speech is audible at the same instant.
    pub fn first_speech_collision(&self) -> Option<(usize, usize)> {
        let windows: Vec<(usize, f64, f64)> = self
            .segments
            .iter()
            .enumerate()
            .flat_map(|(i, seg)| seg.audible_windows().map(move |(s, e)| (i, s, e)))
            .collect();

        for (a, &(seg_a, start_a, end_a)) in windows.iter().enumerate() {
            for &(seg_b, start_b, end_b) in &windows[a + 1..] {
                if seg_a == seg_b {
                    continue;
                }
                if start_a.max(start_b) + TIME_EPSILON < end_a.min(end_b) {
                    return Some((seg_a, seg_b));
                }
            }
        }
        None
    }

    /// Whether two segments' speech is ever audible simultaneously.
    pub fn has_overlapping_speech(&self) -> bool {
        self.first_speech_collision().is_some()
    }

    /// All recorded per-shot fallbacks, placed and skipped.
    pub fn failures(&self) -> impl Iterator<Item = &EffectFailure> {
        self.segments
            .iter()
            .flat_map(|seg| seg.failures.iter())
            .chain(self.skipped.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::TransitionKind;

    fn segment(sequence: u32, placed_start: f64, length: f64, speech: Vec<SpeechClip>) -> TimelineSegment {
        TimelineSegment {
            sequence,
            shot_index: sequence as usize,
            source_shot: ShotSpan::new(0.0, length),
            trimmed: TimeSpan::new(0.0, length),
            placed_start,
            transition: Transition::cut(),
            speed_factor: 1.0,
            net_duration: length,
            speech,
            failures: Vec::new(),
        }
    }

    fn clip(start: f64, end: f64) -> SpeechClip {
        SpeechClip {
            start,
            end,
            fade_in: 0.1,
            fade_out: 0.1,
        }
    }

    #[test]
    fn test_segment_duration_respects_speed() {
        let mut seg = segment(0, 0.0, 4.0, vec![]);
        seg.speed_factor = 2.0;
        assert!((seg.duration() - 2.0).abs() < 1e-9);
        assert!((seg.source_time(1.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_overlaps() {
        let mut second = segment(1, 2.5, 3.0, vec![]);
        second.transition = Transition::new(TransitionKind::Crossfade, 0.5);
        let timeline = CompositeTimeline {
            segments: vec![segment(0, 0.0, 3.0, vec![]), second],
            total_duration: 5.5,
            ..Default::default()
        };
        let overlaps = timeline.overlaps();
        assert_eq!(overlaps.len(), 1);
        assert!((overlaps[0] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_speech_collision_detection() {
        let timeline = CompositeTimeline {
            segments: vec![
                segment(0, 0.0, 3.0, vec![clip(0.0, 3.0)]),
                segment(1, 2.5, 3.0, vec![clip(0.0, 1.0)]),
            ],
            total_duration: 5.5,
            ..Default::default()
        };
        assert_eq!(timeline.first_speech_collision(), Some((0, 1)));

        let timeline = CompositeTimeline {
            segments: vec![
                segment(0, 0.0, 3.0, vec![clip(0.0, 2.5)]),
                segment(1, 2.5, 3.0, vec![clip(0.0, 1.0)]),
            ],
            total_duration: 5.5,
            ..Default::default()
        };
        assert!(!timeline.has_overlapping_speech());
    }
}
