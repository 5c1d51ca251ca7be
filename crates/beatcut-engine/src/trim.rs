//! Per-shot trim policy.
//!
//! Dialogue is never truncated: a shot overlapping any speech keeps its
//! full length. Silent shots end at their first internal visual change
//! (found with a stricter correlation threshold than segmentation), and
//! never run longer than the configured ceiling.

use std::path::PathBuf;

use async_trait::async_trait;
use beatcut_media::{find_change_point, SegmenterConfig};
use beatcut_models::{ShotSpan, SpeechInterval};
use tracing::{debug, warn};

use crate::config::TrimConfig;
use crate::error::AssemblyResult;

/// Finds the first visual change inside a shot.
#[async_trait]
pub trait ChangePointSource: Send + Sync {
    /// Change time relative to `span.start`, or `None` when the shot is stable.
    async fn first_change(
        &self,
        span: ShotSpan,
        threshold: f64,
        min_gap_secs: f64,
    ) -> AssemblyResult<Option<f64>>;
}

/// Scans the source video with FFmpeg-decoded frames.
#[derive(Debug, Clone)]
pub struct VideoChangePoints {
    path: PathBuf,
    fps: f64,
    segmenter: SegmenterConfig,
}

impl VideoChangePoints {
    pub fn new(path: impl Into<PathBuf>, fps: f64, segmenter: SegmenterConfig) -> Self {
        Self {
            path: path.into(),
            fps,
            segmenter,
        }
    }
}

#[async_trait]
impl ChangePointSource for VideoChangePoints {
    async fn first_change(
        &self,
        span: ShotSpan,
        threshold: f64,
        min_gap_secs: f64,
    ) -> AssemblyResult<Option<f64>> {
        let change =
            find_change_point(&self.path, span, self.fps, threshold, min_gap_secs, &self.segmenter)
                .await?;
        Ok(change)
    }
}

/// Why a shot kept the length it did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrimDecision {
    /// Speech overlaps the shot; the whole shot is kept
    FullShot(f64),
    /// Cut at the first internal visual change
    ChangePoint(f64),
    /// Stable shot, kept up to the ceiling
    Ceiling(f64),
}

impl TrimDecision {
    /// Target duration in seconds.
    pub fn duration(&self) -> f64 {
        match *self {
            TrimDecision::FullShot(d) | TrimDecision::ChangePoint(d) | TrimDecision::Ceiling(d) => d,
        }
    }
}

/// Decides how much of each shot to keep.
#[derive(Debug, Clone, Default)]
pub struct TrimPolicy {
    config: TrimConfig,
}

impl TrimPolicy {
    pub fn new(config: TrimConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrimConfig {
        &self.config
    }

    /// Whether any speech interval overlaps the shot.
    pub fn has_speech(span: ShotSpan, speech: &[SpeechInterval]) -> bool {
        speech.iter().any(|s| span.overlaps(s.start, s.end))
    }

    /// Decide from an already known change point.
    pub fn decide(
        &self,
        span: ShotSpan,
        speech: &[SpeechInterval],
        change_point: Option<f64>,
    ) -> TrimDecision {
        if Self::has_speech(span, speech) {
            return TrimDecision::FullShot(span.duration());
        }

        let ceiling = self.config.max_duration_secs;
        match change_point {
            Some(change) if change < ceiling && change < span.duration() => {
                TrimDecision::ChangePoint(change)
            }
            _ => TrimDecision::Ceiling(span.duration().min(ceiling)),
        }
    }

    /// Decide for one shot, scanning for a change point only when the shot is silent.
    ///
    /// A failed scan degrades to the ceiling rule.
    pub async fn target_duration(
        &self,
        shot_index: usize,
        span: ShotSpan,
        speech: &[SpeechInterval],
        source: &dyn ChangePointSource,
    ) -> TrimDecision {
        if Self::has_speech(span, speech) {
            return self.decide(span, speech, None);
        }

        let change = match source
            .first_change(span, self.config.change_threshold, self.config.min_change_gap_secs)
            .await
        {
            Ok(change) => change,
            Err(e) => {
                warn!(shot = shot_index, error = %e, "Change-point scan failed, using ceiling");
                metrics::counter!("beatcut_shot_fallbacks_total", "reason" => "change_scan")
                    .increment(1);
                None
            }
        };

        let decision = self.decide(span, speech, change);
        debug!(shot = shot_index, ?decision, "Trim decided");
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssemblyError;

    struct FixedChange(Option<f64>);

    #[async_trait]
    impl ChangePointSource for FixedChange {
        async fn first_change(&self, _: ShotSpan, _: f64, _: f64) -> AssemblyResult<Option<f64>> {
            Ok(self.0)
        }
    }

    struct BrokenScan;

    #[async_trait]
    impl ChangePointSource for BrokenScan {
        async fn first_change(&self, _: ShotSpan, _: f64, _: f64) -> AssemblyResult<Option<f64>> {
            Err(AssemblyError::missing_input("decoder gone"))
        }
    }

    #[test]
    fn test_speech_keeps_full_shot() {
        let policy = TrimPolicy::default();
        let span = ShotSpan::new(10.0, 22.0);
        let speech = [SpeechInterval::new(21.5, 24.0)];

        assert_eq!(policy.decide(span, &speech, Some(2.0)), TrimDecision::FullShot(12.0));
    }

    #[test]
    fn test_touching_speech_does_not_count() {
        let span = ShotSpan::new(10.0, 12.0);
        assert!(!TrimPolicy::has_speech(span, &[SpeechInterval::new(12.0, 14.0)]));
        assert!(!TrimPolicy::has_speech(span, &[]));
    }

    #[test]
    fn test_change_point_bounded_by_ceiling() {
        let policy = TrimPolicy::default();
        let span = ShotSpan::new(0.0, 12.0);

        assert_eq!(policy.decide(span, &[], Some(2.4)), TrimDecision::ChangePoint(2.4));
        assert_eq!(policy.decide(span, &[], Some(7.0)), TrimDecision::Ceiling(5.0));
        assert_eq!(policy.decide(span, &[], None), TrimDecision::Ceiling(5.0));
    }

    #[test]
    fn test_short_stable_shot_kept_whole() {
        let policy = TrimPolicy::default();
        assert_eq!(
            policy.decide(ShotSpan::new(3.0, 6.5), &[], None),
            TrimDecision::Ceiling(3.5)
        );
    }

    #[tokio::test]
    async fn test_eight_second_shot_without_change_is_five() {
        let policy = TrimPolicy::default();
        let decision = policy
            .target_duration(0, ShotSpan::new(0.0, 8.0), &[], &FixedChange(None))
            .await;
        assert_eq!(decision.duration(), 5.0);
    }

    #[tokio::test]
    async fn test_failed_scan_uses_ceiling() {
        let policy = TrimPolicy::new(TrimConfig::default().with_max_duration(4.0));
        let decision = policy
            .target_duration(3, ShotSpan::new(0.0, 9.0), &[], &BrokenScan)
            .await;
        assert_eq!(decision, TrimDecision::Ceiling(4.0));
    }
}
