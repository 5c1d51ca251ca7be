//! Speech intervals derived from transcription.

use serde::{Deserialize, Serialize};

/// A time range, in seconds, during which someone is speaking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeechInterval {
    pub start: f64,
    pub end: f64,
}

impl SpeechInterval {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Intersection with `[start, end)`, if it has positive length.
    pub fn intersect(&self, start: f64, end: f64) -> Option<(f64, f64)> {
        let lo = self.start.max(start);
        let hi = self.end.min(end);
        (lo < hi).then_some((lo, hi))
    }
}

/// One sentence record from the transcription collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSentence {
    /// Sentence text
    #[serde(default)]
    pub text: String,
    /// Word-level `[start_ms, end_ms]` pairs
    #[serde(default)]
    pub timestamp: Vec<[u64; 2]>,
}

impl TranscriptSentence {
    /// Interval from the first pair's start to the last pair's end.
    pub fn interval(&self) -> Option<SpeechInterval> {
        let first = self.timestamp.first()?;
        let last = self.timestamp.last()?;
        let start = first[0] as f64 / 1000.0;
        let end = last[1] as f64 / 1000.0;
        (end > start).then(|| SpeechInterval::new(start, end))
    }
}

/// Convert transcription sentences into ordered speech intervals.
pub fn speech_intervals(sentences: &[TranscriptSentence]) -> Vec<SpeechInterval> {
    let mut intervals: Vec<SpeechInterval> =
        sentences.iter().filter_map(TranscriptSentence::interval).collect();
    intervals.sort_by(|a, b| a.start.total_cmp(&b.start));
    intervals
}
