//! Timeline compositing.
//!
//! Shots are placed left to right. Each segment starts its leading
//! transition before the cursor so the two shots blend for exactly the
//! transition length, and the previous segment's speech is cut where the
//! new segment starts so two speech sources are never audible together.

use beatcut_models::{
    CompositeTimeline, EffectFailure, EffectFailureKind, RunId, ShotSpan, SpeechClip, SpeechInterval,
    TimeSpan, TimelineSegment, Transition, TIME_EPSILON,
};
use tracing::{debug, info, warn};

use crate::beat_sync::BeatSynchronizer;
use crate::config::{BeatSyncConfig, CompositorConfig};
use crate::speech::SpeechIsolator;

/// Per-shot input to the compositor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShotPlan {
    /// Index in the tagged shot list
    pub shot_index: usize,
    pub span: ShotSpan,
    /// Kept duration from the trim policy
    pub target: f64,
    /// Transition into this shot (a cut for the first one)
    pub transition: Transition,
}

impl ShotPlan {
    /// Pair shot spans and targets with the transitions between them.
    pub fn zip(spans: &[ShotSpan], targets: &[f64], transitions: &[Transition]) -> Vec<ShotPlan> {
        spans
            .iter()
            .zip(targets)
            .enumerate()
            .map(|(i, (span, target))| ShotPlan {
                shot_index: i,
                span: *span,
                target: *target,
                transition: if i == 0 {
                    Transition::cut()
                } else {
                    transitions.get(i - 1).copied().unwrap_or_default()
                },
            })
            .collect()
    }
}

/// Places shots on the output timeline.
#[derive(Debug, Clone, Default)]
pub struct TimelineCompositor {
    config: CompositorConfig,
    speed_bounds: BeatSyncConfig,
    beat_sync: BeatSynchronizer,
    isolator: SpeechIsolator,
}

impl TimelineCompositor {
    pub fn new(
        config: CompositorConfig,
        beat_sync_config: BeatSyncConfig,
        isolator: SpeechIsolator,
    ) -> Self {
        Self {
            config,
            beat_sync: BeatSynchronizer::new(beat_sync_config.clone()),
            speed_bounds: beat_sync_config,
            isolator,
        }
    }

    /// Build the composite timeline for one run.
    ///
    /// `source_duration` bounds every source span; `beats` are background
    /// beat times; `speech` are source speech intervals.
    pub fn compose(
        &self,
        run_id: RunId,
        plans: &[ShotPlan],
        beats: &[f64],
        speech: &[SpeechInterval],
        source_duration: f64,
    ) -> CompositeTimeline {
        let mut timeline = CompositeTimeline::new(run_id);
        let mut cursor = 0.0_f64;

        for plan in plans {
            let mut failures = Vec::new();

            let snap = self.beat_sync.synchronize(plan.target, cursor, beats);
            let net = snap.duration;
            let gross = net + plan.transition.duration;

            let src_start = plan.span.start;
            let src_end = (src_start + gross).min(source_duration);
            let span_len = src_end - src_start;

            if span_len <= TIME_EPSILON {
                let failure = EffectFailure::new(
                    plan.shot_index,
                    EffectFailureKind::EmptySourceSpan,
                    format!("no source left at {:.3}s", src_start),
                );
                record(&failure);
                timeline.skipped.push(failure);
                continue;
            }

            let speed = self.speed_for(plan.shot_index, span_len, gross, &mut failures);
            let duration = span_len / speed;

            let transition = match timeline.segments.last() {
                Some(prev) => {
                    let limit = prev.duration().min(duration);
                    if plan.transition.duration > limit + TIME_EPSILON {
                        let failure = EffectFailure::new(
                            plan.shot_index,
                            EffectFailureKind::TransitionClamped,
                            format!(
                                "{} of {:.3}s clamped to {:.3}s",
                                plan.transition.kind, plan.transition.duration, limit
                            ),
                        );
                        record(&failure);
                        failures.push(failure);
                        Transition::new(plan.transition.kind, limit)
                    } else {
                        plan.transition
                    }
                }
                None => Transition::new(plan.transition.kind, 0.0),
            };

            let placed_start = (cursor - transition.duration).max(0.0);

            if let Some(prev) = timeline.segments.last_mut() {
                let cutoff = placed_start - prev.placed_start;
                cut_speech(&mut prev.speech, cutoff, self.config.handoff_fade_secs);
            }

            let trimmed = TimeSpan::new(src_start, src_end);
            let segment = TimelineSegment {
                sequence: timeline.segments.len() as u32,
                shot_index: plan.shot_index,
                source_shot: plan.span,
                trimmed,
                placed_start,
                transition,
                speed_factor: speed,
                net_duration: net,
                speech: self.isolator.isolate(trimmed, speed, speech),
                failures,
            };

            debug!(
                shot = plan.shot_index,
                sequence = segment.sequence,
                placed_start = format!("{:.3}", placed_start),
                duration = format!("{:.3}", duration),
                speed = format!("{:.3}", speed),
                beat = ?snap.beat,
                "Segment placed"
            );

            cursor = placed_start + duration;
            timeline.segments.push(segment);
        }

        timeline.total_duration = cursor;

        info!(
            run_id = %timeline.run_id,
            segments = timeline.segments.len(),
            skipped = timeline.skipped.len(),
            duration = format!("{:.2}", cursor),
            "Timeline composed"
        );

        timeline
    }

    /// Speed that fits `span_len` source seconds into a `gross` slot.
    fn speed_for(
        &self,
        shot_index: usize,
        span_len: f64,
        gross: f64,
        failures: &mut Vec<EffectFailure>,
    ) -> f64 {
        if (span_len - gross).abs() <= self.config.speed_tolerance_secs
            || gross <= self.config.min_speed_adjust_secs
        {
            return 1.0;
        }

        let factor = span_len / gross;
        if self.speed_bounds.accepts(factor) {
            factor
        } else {
            let failure = EffectFailure::new(
                shot_index,
                EffectFailureKind::SpeedOutOfRange,
                format!("speed {:.3} outside [{}, {}]", factor, self.speed_bounds.min_speed, self.speed_bounds.max_speed),
            );
            record(&failure);
            failures.push(failure);
            1.0
        }
    }
}

/// Silence `clips` from `cutoff` (segment-relative output seconds) onward.
fn cut_speech(clips: &mut Vec<SpeechClip>, cutoff: f64, fade: f64) {
    clips.retain(|clip| clip.start + TIME_EPSILON < cutoff);
    for clip in clips.iter_mut() {
        if clip.end > cutoff {
            clip.end = cutoff;
            let len = clip.duration();
            clip.fade_out = fade.min(len);
            clip.fade_in = clip.fade_in.min(len - clip.fade_out);
        }
    }
}

fn record(failure: &EffectFailure) {
    warn!(
        shot = failure.shot_index,
        kind = failure.kind.as_str(),
        "Per-shot effect fell back: {}",
        failure.message
    );
    metrics::counter!("beatcut_shot_fallbacks_total", "reason" => failure.kind.as_str()).increment(1);
}
