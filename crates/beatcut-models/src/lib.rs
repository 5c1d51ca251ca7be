//! Shared data models for BeatCut.
//!
//! This crate provides Serde-serializable types for:
//! - Shots, shot spans and semantic tags
//! - Speech intervals derived from transcription
//! - Transitions between adjacent shots
//! - Placed timeline segments and the composite timeline
//! - The background music layer
//! - Run identity

pub mod mix;
pub mod run;
pub mod shot;
pub mod speech;
pub mod tags;
pub mod timeline;
pub mod transition;

// Re-export common types
pub use mix::BackgroundLayer;
pub use run::RunId;
pub use shot::{Shot, ShotSpan, TaggingResult};
pub use speech::{speech_intervals, SpeechInterval, TranscriptSentence};
pub use tags::{TagField, TagSet};
pub use timeline::{
    CompositeTimeline, EffectFailure, EffectFailureKind, SpeechClip, TimeSpan, TimelineSegment,
    TIME_EPSILON,
};
pub use transition::{Transition, TransitionKind};
