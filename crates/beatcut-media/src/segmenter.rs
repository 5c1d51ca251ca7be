//! Shot segmentation by hue-histogram discontinuity.
//!
//! # Algorithm
//!
//! 1. Decode every frame at a small thumbnail size
//! 2. Compute a min-max normalized hue histogram per frame
//! 3. Correlate each histogram with the previous frame's
//! 4. Declare a boundary wherever the correlation drops below the threshold
//!
//! Boundaries are not debounced, so raising the threshold can only add cuts.
//! The same comparison, run inside one shot with a stricter threshold, finds
//! the first internal visual change ([`ChangePointScanner`]).

use std::path::Path;

use beatcut_models::ShotSpan;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::MediaResult;
use crate::frames::FrameReader;
use crate::histogram::HueHistogram;
use crate::probe::probe_media;

/// Shot segmentation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Correlation below which consecutive frames start a new shot.
    ///
    /// - Default (0.7): hard cuts only
    /// - 0.85: finer segmentation, picks up large camera moves
    pub threshold: f64,

    /// Frame rate assumed when the container reports none.
    pub default_fps: f64,

    /// Hue histogram resolution.
    pub hue_bins: usize,

    /// Decode width for histogram frames.
    pub frame_width: u32,

    /// Decode height for histogram frames.
    pub frame_height: u32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            default_fps: 25.0,
            hue_bins: 180,
            frame_width: 160,
            frame_height: 90,
        }
    }
}

impl SegmenterConfig {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_default_fps(mut self, fps: f64) -> Self {
        self.default_fps = fps;
        self
    }

    pub fn with_hue_bins(mut self, bins: usize) -> Self {
        self.hue_bins = bins;
        self
    }

    /// Resolve a reported frame rate, falling back to `default_fps`.
    pub fn resolve_fps(&self, reported: Option<f64>) -> f64 {
        match reported {
            Some(fps) if fps.is_finite() && fps > 0.0 => fps,
            _ => {
                warn!(
                    reported = ?reported,
                    fallback = self.default_fps,
                    "Frame rate missing or invalid, using fallback"
                );
                self.default_fps
            }
        }
    }
}

/// Incremental shot segmenter.
///
/// Feed frames in decode order with [`push_frame`](Self::push_frame), then
/// call [`finish`](Self::finish) to obtain the contiguous shot spans.
#[derive(Debug)]
pub struct ShotSegmenter {
    threshold: f64,
    fps: f64,
    hue_bins: usize,
    prev: Option<HueHistogram>,
    frame_idx: usize,
    start_frame: usize,
    spans: Vec<ShotSpan>,
}

impl ShotSegmenter {
    /// Create a segmenter for a stream with the given reported frame rate.
    pub fn new(config: &SegmenterConfig, fps: Option<f64>) -> Self {
        Self {
            threshold: config.threshold,
            fps: config.resolve_fps(fps),
            hue_bins: config.hue_bins,
            prev: None,
            frame_idx: 0,
            start_frame: 0,
            spans: Vec::new(),
        }
    }

    /// Frame rate used for timestamps.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Number of frames consumed.
    pub fn frame_count(&self) -> usize {
        self.frame_idx
    }

    /// Consume one decoded frame. Returns `true` when it starts a new shot.
    pub fn push_frame(&mut self, frame: &RgbImage) -> bool {
        let hist = HueHistogram::from_image(frame, self.hue_bins);
        self.push_histogram(hist)
    }

    /// Consume one precomputed histogram. Returns `true` when it starts a new shot.
    pub fn push_histogram(&mut self, hist: HueHistogram) -> bool {
        let mut boundary = false;

        if let Some(prev) = &self.prev {
            let score = prev.correlation(&hist);
            if score < self.threshold {
                debug!(
                    frame = self.frame_idx,
                    score = format!("{:.3}", score),
                    threshold = self.threshold,
                    "Shot boundary"
                );
                self.spans.push(ShotSpan::new(
                    self.start_frame as f64 / self.fps,
                    self.frame_idx as f64 / self.fps,
                ));
                self.start_frame = self.frame_idx;
                boundary = true;
            }
        }

        self.prev = Some(hist);
        self.frame_idx += 1;
        boundary
    }

    /// Close the final shot at end of stream.
    pub fn finish(mut self) -> Vec<ShotSpan> {
        if self.frame_idx > self.start_frame {
            self.spans.push(ShotSpan::new(
                self.start_frame as f64 / self.fps,
                self.frame_idx as f64 / self.fps,
            ));
        }
        self.spans
    }
}

/// Finds the first visual change inside a shot.
///
/// A change only counts once more than `min_gap_secs` have elapsed since the
/// first scanned frame.
#[derive(Debug)]
pub struct ChangePointScanner {
    threshold: f64,
    min_gap_secs: f64,
    fps: f64,
    hue_bins: usize,
    prev: Option<HueHistogram>,
    frame_idx: usize,
}

impl ChangePointScanner {
    pub fn new(threshold: f64, min_gap_secs: f64, fps: f64, hue_bins: usize) -> Self {
        Self {
            threshold,
            min_gap_secs,
            fps: if fps.is_finite() && fps > 0.0 { fps } else { 25.0 },
            hue_bins,
            prev: None,
            frame_idx: 0,
        }
    }

    /// Consume one frame; returns the change time relative to the scan start.
    pub fn push_frame(&mut self, frame: &RgbImage) -> Option<f64> {
        let hist = HueHistogram::from_image(frame, self.hue_bins);
        self.push_histogram(hist)
    }

    /// Consume one histogram; returns the change time relative to the scan start.
    pub fn push_histogram(&mut self, hist: HueHistogram) -> Option<f64> {
        let mut change = None;

        if let Some(prev) = &self.prev {
            let relative = self.frame_idx as f64 / self.fps;
            if prev.correlation(&hist) < self.threshold && relative > self.min_gap_secs {
                change = Some(relative);
            }
        }

        self.prev = Some(hist);
        self.frame_idx += 1;
        change
    }
}

/// Segment a whole video file into shots.
pub async fn segment_video(path: &Path, config: &SegmenterConfig) -> MediaResult<Vec<ShotSpan>> {
    let info = probe_media(path).await?;
    let mut segmenter = ShotSegmenter::new(config, info.fps);

    info!(
        path = %path.display(),
        fps = segmenter.fps(),
        threshold = config.threshold,
        "Segmenting video into shots"
    );

    let mut reader = FrameReader::open(path, config.frame_width, config.frame_height).await?;
    while let Some(frame) = reader.next_frame().await? {
        segmenter.push_frame(&frame);
    }
    reader.finish().await?;

    let frames = segmenter.frame_count();
    let spans = segmenter.finish();

    metrics::counter!("beatcut_shots_detected_total").increment(spans.len() as u64);
    info!(shots = spans.len(), frames, "Shot segmentation complete");

    Ok(spans)
}

/// Scan `span` of a video for its first internal visual change.
///
/// Returns the change time relative to `span.start`, or `None` when the shot
/// stays visually stable.
pub async fn find_change_point(
    path: &Path,
    span: ShotSpan,
    fps: f64,
    threshold: f64,
    min_gap_secs: f64,
    config: &SegmenterConfig,
) -> MediaResult<Option<f64>> {
    let mut scanner = ChangePointScanner::new(threshold, min_gap_secs, fps, config.hue_bins);
    let mut reader = FrameReader::open_range(
        path,
        span.start,
        span.duration(),
        config.frame_width,
        config.frame_height,
    )
    .await?;

    while let Some(frame) = reader.next_frame().await? {
        if let Some(change) = scanner.push_frame(&frame) {
            reader.close().await?;
            debug!(
                start = span.start,
                change = format!("{:.3}", change),
                "Internal change point found"
            );
            return Ok(Some(change));
        }
    }

    reader.finish().await?;
    Ok(None)
}
