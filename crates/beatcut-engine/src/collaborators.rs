//! External collaborators: shot tagging and transcription.
//!
//! The models themselves run elsewhere; the engine consumes their output
//! through these traits. File adapters read results produced ahead of time.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use beatcut_models::{Shot, ShotSpan, TaggingResult, TranscriptSentence};
use serde::Deserialize;
use tracing::info;

use crate::error::{AssemblyError, AssemblyResult};

/// Labels shots and summarizes the mood of a video.
#[async_trait]
pub trait ShotTagger: Send + Sync {
    /// Tag `shots` of `video`. The result may carry its own shot list.
    async fn tag(&self, video: &Path, shots: &[ShotSpan]) -> AssemblyResult<TaggingResult>;
}

/// Transcribes the speech of a video.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, video: &Path) -> AssemblyResult<Vec<TranscriptSentence>>;
}

/// Tags read from a JSON file written by the tagging model.
///
/// When the file lists no shots, the detected shots are used untagged with
/// the file's summary.
#[derive(Debug, Clone)]
pub struct TagFile {
    path: PathBuf,
}

impl TagFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ShotTagger for TagFile {
    async fn tag(&self, _video: &Path, shots: &[ShotSpan]) -> AssemblyResult<TaggingResult> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AssemblyError::collaborator("tagger", format!("{}: {}", self.path.display(), e))
        })?;
        let mut result = TaggingResult::from_json(&text)
            .map_err(|e| AssemblyError::collaborator("tagger", format!("invalid tags: {}", e)))?;

        if result.shots.is_empty() {
            result.shots = shots.iter().copied().map(Shot::from).collect();
        }

        info!(
            path = %self.path.display(),
            shots = result.shots.len(),
            summary = %result.summary,
            "Loaded shot tags"
        );
        Ok(result)
    }
}

/// No tagging model: detected shots with empty tags and no summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct UntaggedShots;

#[async_trait]
impl ShotTagger for UntaggedShots {
    async fn tag(&self, _video: &Path, shots: &[ShotSpan]) -> AssemblyResult<TaggingResult> {
        Ok(TaggingResult {
            shots: shots.iter().copied().map(Shot::from).collect(),
            summary: String::new(),
        })
    }
}

/// Accepted transcript file layouts.
#[derive(Deserialize)]
#[serde(untagged)]
enum TranscriptDocument {
    Sentences(Vec<TranscriptSentence>),
    Wrapped {
        #[serde(alias = "sentence_info")]
        sentences: Vec<TranscriptSentence>,
    },
}

/// Transcript read from a JSON file.
#[derive(Debug, Clone)]
pub struct TranscriptFile {
    path: PathBuf,
}

impl TranscriptFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Transcriber for TranscriptFile {
    async fn transcribe(&self, _video: &Path) -> AssemblyResult<Vec<TranscriptSentence>> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AssemblyError::collaborator("transcriber", format!("{}: {}", self.path.display(), e))
        })?;
        let document: TranscriptDocument = serde_json::from_str(&text).map_err(|e| {
            AssemblyError::collaborator("transcriber", format!("invalid transcript: {}", e))
        })?;

        let sentences = match document {
            TranscriptDocument::Sentences(s) | TranscriptDocument::Wrapped { sentences: s } => s,
        };
        info!(path = %self.path.display(), sentences = sentences.len(), "Loaded transcript");
        Ok(sentences)
    }
}

/// No transcription: the video is treated as speech-free.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSpeech;

#[async_trait]
impl Transcriber for NoSpeech {
    async fn transcribe(&self, _video: &Path) -> AssemblyResult<Vec<TranscriptSentence>> {
        Ok(Vec::new())
    }
}
