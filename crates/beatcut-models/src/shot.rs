//! Shots produced by segmentation and enriched by the tagging model.

use serde::{Deserialize, Serialize};

use crate::tags::TagSet;

/// A visually continuous `[start, end)` interval of the source video.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShotSpan {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds (exclusive)
    pub end: f64,
}

impl ShotSpan {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Duration of the span in seconds.
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Whether `[start, end)` intersects this span with positive length.
    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        self.start.max(start) < self.end.min(end)
    }
}

/// A tagged shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Semantic tags
    #[serde(default)]
    pub tags: TagSet,
    /// Raw tagger answer
    #[serde(default, alias = "raw_output")]
    pub raw_text: String,
}

impl Shot {
    /// Create an untagged shot.
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start,
            end,
            tags: TagSet::default(),
            raw_text: String::new(),
        }
    }

    /// Attach tags.
    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = tags;
        self
    }

    /// Time span of the shot.
    pub fn span(&self) -> ShotSpan {
        ShotSpan::new(self.start, self.end)
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.span().duration()
    }
}

impl From<ShotSpan> for Shot {
    fn from(span: ShotSpan) -> Self {
        Shot::new(span.start, span.end)
    }
}

/// Output of the tagging collaborator for one video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaggingResult {
    /// Per-shot tags, in time order
    pub shots: Vec<Shot>,
    /// Free-text mood summary for the whole video
    #[serde(default)]
    pub summary: String,
}

impl TaggingResult {
    /// Fill missing tag sets from the raw tagger text and sort shots by start.
    pub fn normalized(mut self) -> Self {
        for shot in &mut self.shots {
            if shot.tags.is_empty() && !shot.raw_text.trim().is_empty() {
                shot.tags = TagSet::parse(&shot.raw_text);
            }
        }
        self.shots.sort_by(|a, b| a.start.total_cmp(&b.start));
        self
    }

    /// Parse a tagging result from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(json).map(Self::normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_overlap() {
        let span = ShotSpan::new(2.0, 5.0);
        assert!(span.overlaps(4.9, 6.0));
        assert!(span.overlaps(0.0, 10.0));
        assert!(!span.overlaps(5.0, 6.0));
        assert!(!span.overlaps(0.0, 2.0));
        assert!((span.duration() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_tagging_result_from_tagger_json() {
        let json = r#"{
            "shots": [
                {"start": 3.0, "end": 6.0, "tags": {}, "raw_output": "Scene: Forest, Emotion: Sad"},
                {"start": 0.0, "end": 3.0, "tags": {"Scene": "Kitchen", "Mood": "Happy"}}
            ],
            "summary": "A cheerful cooking vlog"
        }"#;

        let result = TaggingResult::from_json(json).unwrap();
        assert_eq!(result.shots.len(), 2);
        assert_eq!(result.shots[0].tags.scene.as_deref(), Some("Kitchen"));
        assert_eq!(result.shots[1].tags.scene.as_deref(), Some("Forest"));
        assert_eq!(result.shots[1].tags.mood.as_deref(), Some("Sad"));
        assert_eq!(result.summary, "A cheerful cooking vlog");
    }
}
