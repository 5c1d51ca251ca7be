#![deny(unreachable_patterns)]
//! FFmpeg plumbing and signal processing for BeatCut.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with multiple inputs
//! - Progress parsing from `-progress pipe:2`
//! - Media probing through FFprobe
//! - Raw RGB frame decoding and hue-histogram shot segmentation
//! - PCM decoding and onset-based beat tracking
//! - Single-pass rendering of a composite timeline

pub mod audio;
pub mod beats;
pub mod command;
pub mod error;
pub mod frames;
pub mod histogram;
pub mod probe;
pub mod render;
pub mod segmenter;

pub use audio::decode_mono_pcm;
pub use beats::{BeatAnalyzer, BeatTracker, BeatTrackingConfig, OnsetBeatTracker};
pub use command::{create_ffmpeg_command, FfmpegCommand, FfmpegProgress, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use frames::FrameReader;
pub use histogram::{correlation, HueHistogram};
pub use probe::{probe_media, MediaInfo};
pub use render::{build_filter_graph, render_timeline, FilterGraph, GraphInputs, RenderConfig};
pub use segmenter::{
    find_change_point, segment_video, ChangePointScanner, SegmenterConfig, ShotSegmenter,
};
