//! Music-synchronized video assembly engine.
//!
//! This crate provides:
//! - Per-shot trim, transition and beat-snapping decisions
//! - Speech isolation and timeline compositing
//! - Background music retrieval and mixing
//! - Collaborator boundaries for tagging, transcription and similarity
//! - The pipeline orchestrator behind the `beatcut` binary

pub mod beat_sync;
pub mod collaborators;
pub mod compositor;
pub mod config;
pub mod error;
pub mod logging;
pub mod mixer;
pub mod music;
pub mod pipeline;
pub mod report;
pub mod similarity;
pub mod speech;
pub mod transitions;
pub mod trim;

pub use beat_sync::{BeatSnap, BeatSynchronizer};
pub use collaborators::{NoSpeech, ShotTagger, TagFile, Transcriber, TranscriptFile, UntaggedShots};
pub use compositor::{ShotPlan, TimelineCompositor};
pub use config::AssemblyConfig;
pub use error::{AssemblyError, AssemblyResult};
pub use logging::RunLogger;
pub use mixer::AudioMixer;
pub use music::MusicLibrary;
pub use pipeline::{AssemblyPipeline, AssemblyRequest, PipelineOutcome};
pub use report::RunReport;
pub use similarity::{tag_similarity, LexicalSimilarity, TextSimilarity};
pub use speech::SpeechIsolator;
pub use transitions::TransitionPlanner;
pub use trim::{ChangePointSource, TrimDecision, TrimPolicy, VideoChangePoints};
