//! Assembly error types.

use std::path::Path;

use beatcut_media::MediaError;
use thiserror::Error;

pub type AssemblyResult<T> = Result<T, AssemblyError>;

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("No matching music found or custom background track is invalid")]
    NoMatchingMusic,

    #[error("Beat tracking failed: {0}")]
    BeatTracking(String),

    #[error("Effect failed for shot {shot_index}: {message}")]
    PerShotEffect { shot_index: usize, message: String },

    #[error("Render failed: {0}")]
    FatalRender(String),

    #[error("{collaborator} failed: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AssemblyError {
    pub fn missing_input(msg: impl Into<String>) -> Self {
        Self::MissingInput(msg.into())
    }

    pub fn missing_file(path: &Path) -> Self {
        Self::MissingInput(format!("{} does not exist", path.display()))
    }

    pub fn beat_tracking(msg: impl Into<String>) -> Self {
        Self::BeatTracking(msg.into())
    }

    pub fn per_shot_effect(shot_index: usize, msg: impl Into<String>) -> Self {
        Self::PerShotEffect {
            shot_index,
            message: msg.into(),
        }
    }

    pub fn fatal_render(msg: impl Into<String>) -> Self {
        Self::FatalRender(msg.into())
    }

    pub fn collaborator(collaborator: &'static str, msg: impl Into<String>) -> Self {
        Self::Collaborator {
            collaborator,
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Errors that end a run early with a `(none, message)` outcome.
    pub fn is_pipeline_abort(&self) -> bool {
        matches!(
            self,
            AssemblyError::MissingInput(_) | AssemblyError::NoMatchingMusic
        )
    }

    /// Errors the pipeline absorbs with a documented fallback.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AssemblyError::BeatTracking(_) | AssemblyError::PerShotEffect { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(AssemblyError::NoMatchingMusic.is_pipeline_abort());
        assert!(AssemblyError::missing_input("no shots").is_pipeline_abort());
        assert!(!AssemblyError::fatal_render("encode").is_pipeline_abort());

        assert!(AssemblyError::beat_tracking("silence").is_recoverable());
        assert!(AssemblyError::per_shot_effect(2, "speed").is_recoverable());
        assert!(!AssemblyError::fatal_render("encode").is_recoverable());
        assert!(!AssemblyError::collaborator("tagger", "timeout").is_recoverable());
    }

    #[test]
    fn test_no_music_message() {
        assert_eq!(
            AssemblyError::NoMatchingMusic.to_string(),
            "No matching music found or custom background track is invalid"
        );
    }

    #[test]
    fn test_media_error_converts() {
        let err: AssemblyError = MediaError::FfmpegNotFound.into();
        assert!(matches!(err, AssemblyError::Media(_)));
    }
}
