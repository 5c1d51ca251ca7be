//! Semantic tags attached to a shot by the tagging model.
//!
//! The tagger answers in free text (`Scene: Kitchen, Event: Cooking, ...`).
//! Tags are kept as explicit optional fields; an absent tag only becomes
//! an empty string at the similarity-comparison boundary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One of the fixed tag fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagField {
    Scene,
    Event,
    Weather,
    Mood,
}

impl TagField {
    /// Map a tagger key to a field. `Emotion` is the tagger's name for mood.
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "scene" => Some(Self::Scene),
            "event" => Some(Self::Event),
            "weather" => Some(Self::Weather),
            "mood" | "emotion" => Some(Self::Mood),
            _ => None,
        }
    }
}

/// Fixed set of shot tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawTags")]
pub struct TagSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
}

impl TagSet {
    /// Parse the tagger's free-text answer.
    ///
    /// Entries are newline-separated when the text contains newlines,
    /// comma-separated otherwise. Unknown keys and entries without a colon
    /// are ignored.
    pub fn parse(text: &str) -> Self {
        let parts: Vec<&str> = if text.contains('\n') {
            text.split('\n').collect()
        } else {
            text.split(',').collect()
        };

        let mut tags = Self::default();
        let mut explicit_mood = false;

        for part in parts {
            let Some((key, value)) = part.trim().split_once(':') else {
                continue;
            };
            let Some(field) = TagField::from_key(key) else {
                continue;
            };
            let is_mood_key = key.trim().eq_ignore_ascii_case("mood");
            // An explicit Mood entry wins over Emotion
            if field == TagField::Mood && explicit_mood && !is_mood_key {
                continue;
            }
            tags.set(field, value);
            if is_mood_key {
                explicit_mood = true;
            }
        }

        tags
    }

    /// Builder-style setter.
    pub fn with(mut self, field: TagField, value: impl AsRef<str>) -> Self {
        self.set(field, value.as_ref());
        self
    }

    /// Set a field; blank values clear it.
    pub fn set(&mut self, field: TagField, value: &str) {
        let value = value.trim();
        let value = (!value.is_empty()).then(|| value.to_string());
        match field {
            TagField::Scene => self.scene = value,
            TagField::Event => self.event = value,
            TagField::Weather => self.weather = value,
            TagField::Mood => self.mood = value,
        }
    }

    /// Get a field value.
    pub fn get(&self, field: TagField) -> Option<&str> {
        match field {
            TagField::Scene => self.scene.as_deref(),
            TagField::Event => self.event.as_deref(),
            TagField::Weather => self.weather.as_deref(),
            TagField::Mood => self.mood.as_deref(),
        }
    }

    /// Field value for similarity comparison: absent compares as empty.
    pub fn comparable(&self, field: TagField) -> &str {
        self.get(field).unwrap_or("")
    }

    /// Whether no tag is set.
    pub fn is_empty(&self) -> bool {
        self.scene.is_none() && self.event.is_none() && self.weather.is_none() && self.mood.is_none()
    }
}

/// Wire form of a tag bag: arbitrary keys, as emitted by the tagger.
#[derive(Deserialize)]
struct RawTags(BTreeMap<String, serde_json::Value>);

impl From<RawTags> for TagSet {
    fn from(raw: RawTags) -> Self {
        let mut tags = TagSet::default();
        let mut mood_from_emotion = None;

        for (key, value) in raw.0 {
            let Some(text) = value.as_str() else {
                continue;
            };
            match TagField::from_key(&key) {
                Some(TagField::Mood) if !key.trim().eq_ignore_ascii_case("mood") => {
                    mood_from_emotion = Some(text.to_string());
                }
                Some(field) => tags.set(field, text),
                None => {}
            }
        }

        if tags.mood.is_none() {
            if let Some(text) = mood_from_emotion {
                tags.set(TagField::Mood, &text);
            }
        }

        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_comma_separated() {
        let tags = TagSet::parse("Scene: Kitchen, Event: Cooking, Weather: Indoor, Emotion: Happy");
        assert_eq!(tags.scene.as_deref(), Some("Kitchen"));
        assert_eq!(tags.event.as_deref(), Some("Cooking"));
        assert_eq!(tags.weather.as_deref(), Some("Indoor"));
        assert_eq!(tags.mood.as_deref(), Some("Happy"));
    }

    #[test]
    fn test_parse_newline_separated() {
        let tags = TagSet::parse("Scene: Forest, with trees\nMood: Sad\nnoise line");
        assert_eq!(tags.scene.as_deref(), Some("Forest, with trees"));
        assert_eq!(tags.mood.as_deref(), Some("Sad"));
        assert!(tags.event.is_none());
    }

    #[test]
    fn test_explicit_mood_wins_over_emotion() {
        let tags = TagSet::parse("Mood: Calm, Emotion: Angry");
        assert_eq!(tags.mood.as_deref(), Some("Calm"));

        let tags = TagSet::parse("Emotion: Angry, Mood: Calm");
        assert_eq!(tags.mood.as_deref(), Some("Calm"));
    }

    #[test]
    fn test_blank_values_are_absent() {
        let tags = TagSet::parse("Scene: , Event:   ");
        assert!(tags.is_empty());
        assert_eq!(tags.comparable(TagField::Scene), "");
    }

    #[test]
    fn test_deserialize_tagger_keys() {
        let tags: TagSet =
            serde_json::from_str(r#"{"Scene": "Beach", "Emotion": "Joyful", "Extra": 3}"#).unwrap();
        assert_eq!(tags.scene.as_deref(), Some("Beach"));
        assert_eq!(tags.mood.as_deref(), Some("Joyful"));

        let tags: TagSet =
            serde_json::from_str(r#"{"Emotion": "Angry", "Mood": "Calm"}"#).unwrap();
        assert_eq!(tags.mood.as_deref(), Some("Calm"));
    }

    #[test]
    fn test_serialize_skips_absent() {
        let tags = TagSet::default().with(TagField::Scene, "Kitchen");
        let json = serde_json::to_string(&tags).unwrap();
        assert_eq!(json, r#"{"scene":"Kitchen"}"#);

        let back: TagSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tags);
    }
}
