//! Assembly integration tests.
//!
//! Everything except the last test runs on the planning path and needs no
//! FFmpeg.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use beatcut_engine::config::{MixConfig, SegmenterConfig, TrimConfig};
use beatcut_engine::{
    AssemblyResult, AudioMixer, BeatSynchronizer, ShotPlan, TextSimilarity, TimelineCompositor,
    TransitionPlanner, TrimPolicy,
};
use beatcut_media::{HueHistogram, ShotSegmenter};
use beatcut_models::{
    RunId, Shot, ShotSpan, SpeechInterval, TagField, TagSet, Transition, TransitionKind,
    TIME_EPSILON,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const EPS: f64 = 1e-6;

/// Similarity looked up from a fixed table, symmetric.
struct TableSimilarity(HashMap<(String, String), f64>);

impl TableSimilarity {
    fn new(entries: &[(&str, &str, f64)]) -> Self {
        let mut table = HashMap::new();
        for &(a, b, score) in entries {
            table.insert((a.to_string(), b.to_string()), score);
            table.insert((b.to_string(), a.to_string()), score);
        }
        Self(table)
    }
}

#[async_trait]
impl TextSimilarity for TableSimilarity {
    async fn similarity(&self, a: &str, b: &str) -> AssemblyResult<f64> {
        if a == b {
            return Ok(1.0);
        }
        Ok(self.0.get(&(a.to_string(), b.to_string())).copied().unwrap_or(0.0))
    }
}

fn tagged(start: f64, end: f64, scene: &str, mood: &str) -> Shot {
    Shot::new(start, end).with_tags(
        TagSet::default()
            .with(TagField::Scene, scene)
            .with(TagField::Mood, mood),
    )
}

/// A 16x16 frame made of two hues mixed in the given ratio.
fn frame(rng: &mut StdRng, hue_a: [u8; 3], hue_b: [u8; 3], share_a: f64) -> Vec<u8> {
    let mut data = Vec::with_capacity(16 * 16 * 3);
    for _ in 0..16 * 16 {
        let pixel = if rng.random::<f64>() < share_a { hue_a } else { hue_b };
        data.extend_from_slice(&pixel);
    }
    data
}

/// Synthetic footage: four scenes with noisy colour mixes.
fn footage(seed: u64) -> Vec<HueHistogram> {
    let mut rng = StdRng::seed_from_u64(seed);
    let scenes = [
        ([220, 30, 30], [30, 30, 220], 0.8),
        ([30, 200, 40], [220, 200, 30], 0.6),
        ([30, 30, 220], [200, 30, 200], 0.7),
        ([220, 120, 20], [30, 200, 200], 0.5),
    ];
    let mut frames = Vec::new();
    for (a, b, share) in scenes {
        for _ in 0..20 {
            let jitter = rng.random_range(-0.1..0.1);
            let data = frame(&mut rng, a, b, share + jitter);
            frames.push(HueHistogram::from_rgb(&data, 180));
        }
    }
    frames
}

fn segment(frames: &[HueHistogram], threshold: f64) -> Vec<ShotSpan> {
    let config = SegmenterConfig::default().with_threshold(threshold);
    let mut segmenter = ShotSegmenter::new(&config, Some(20.0));
    for hist in frames {
        segmenter.push_histogram(hist.clone());
    }
    segmenter.finish()
}

#[test]
fn test_higher_threshold_never_yields_fewer_shots() {
    let frames = footage(11);
    let thresholds = [0.1, 0.3, 0.5, 0.7, 0.85, 0.95, 0.99];

    let counts: Vec<usize> = thresholds.iter().map(|&t| segment(&frames, t).len()).collect();
    for pair in counts.windows(2) {
        assert!(pair[1] >= pair[0], "counts not monotone: {:?}", counts);
    }
}

#[test]
fn test_shots_cover_stream_without_gaps() {
    let frames = footage(5);
    for threshold in [0.2, 0.7, 0.99] {
        let spans = segment(&frames, threshold);
        assert!(!spans.is_empty());
        assert!(spans[0].start.abs() < EPS);
        for pair in spans.windows(2) {
            assert!((pair[0].end - pair[1].start).abs() < EPS);
            assert!(pair[0].duration() > 0.0);
        }
        let total = frames.len() as f64 / 20.0;
        assert!((spans.last().unwrap().end - total).abs() < EPS);
    }
}

#[test]
fn test_empty_beats_leave_durations_unchanged() {
    let sync = BeatSynchronizer::default();
    for target in [0.0, 0.3, 1.0, 4.2, 5.0, 17.5] {
        for cursor in [0.0, 2.5, 60.0] {
            let snap = sync.synchronize(target, cursor, &[]);
            assert_eq!(snap.duration, target);
            assert!(!snap.is_snapped());
        }
    }
}

#[test]
fn test_accepted_speed_factor_is_bounded() {
    let sync = BeatSynchronizer::default();
    let mut rng = StdRng::seed_from_u64(3);
    let mut beats: Vec<f64> = (0..200).map(|_| rng.random_range(0.0..120.0)).collect();
    beats.sort_by(f64::total_cmp);

    for _ in 0..500 {
        let target = rng.random_range(0.2..8.0);
        let cursor = rng.random_range(0.0..110.0);
        let snap = sync.synchronize(target, cursor, &beats);
        if snap.is_snapped() {
            assert!((0.5..=2.0).contains(&snap.speed_factor), "{:?}", snap);
            assert!((snap.duration * snap.speed_factor - target).abs() < 1e-9);
        } else {
            assert_eq!(snap.duration, target);
        }
    }
}

#[test]
fn test_transition_decision_is_total_and_deterministic() {
    let planner = TransitionPlanner::default();
    let steps = 40;
    for i in 0..=steps {
        for j in 0..=steps {
            let scene = i as f64 / steps as f64;
            let mood = j as f64 / steps as f64;

            let a = planner.decide(scene, mood, "sad", &mut StdRng::seed_from_u64(9));
            let b = planner.decide(scene, mood, "sad", &mut StdRng::seed_from_u64(9));
            assert_eq!(a, b);

            let expected = if scene < 0.4 {
                assert!(TransitionKind::SCENE_CHANGE.contains(&a.kind));
                0.6
            } else if scene < 0.7 {
                assert_eq!(a.kind, TransitionKind::Crossfade);
                0.5
            } else if mood < 0.5 {
                assert_eq!(a.kind, TransitionKind::FadeBlack);
                0.4
            } else {
                assert_eq!(a.kind, TransitionKind::Cut);
                0.0
            };
            assert!((a.duration - expected).abs() < EPS);
        }
    }
}

#[tokio::test]
async fn test_scenario_kitchen_to_forest() {
    let shots = vec![
        tagged(0.0, 3.0, "Kitchen", "Happy"),
        tagged(3.0, 6.0, "Kitchen", "Happy"),
        tagged(6.0, 9.0, "Forest", "Sad"),
    ];
    let similarity = TableSimilarity::new(&[("Kitchen", "Forest", 0.2), ("Happy", "Sad", 0.1)]);

    for seed in 0..10 {
        let mut rng = StdRng::seed_from_u64(seed);
        let transitions = TransitionPlanner::default()
            .plan(&shots, &similarity, &mut rng)
            .await
            .unwrap();

        assert_eq!(transitions.len(), 2);
        assert_eq!(transitions[0], Transition::cut());
        assert!(TransitionKind::SCENE_CHANGE.contains(&transitions[1].kind));
        assert!((transitions[1].duration - 0.6).abs() < EPS);
    }
}

#[test]
fn test_scenario_stable_silent_shot_trimmed_to_ceiling() {
    let policy = TrimPolicy::new(TrimConfig::default());
    let span = ShotSpan::new(12.0, 20.0);

    assert!((policy.decide(span, &[], None).duration() - 5.0).abs() < EPS);
    // A change after the ceiling does not shorten the shot further
    assert!((policy.decide(span, &[], Some(6.5)).duration() - 5.0).abs() < EPS);
    // Speech elsewhere in the video does not matter
    let speech = [SpeechInterval::new(0.0, 11.0)];
    assert!((policy.decide(span, &speech, None).duration() - 5.0).abs() < EPS);
}

#[test]
fn test_scenario_short_track_looped_over_timeline() {
    let layer = AudioMixer::new(MixConfig::default())
        .plan_background(Path::new("bgm.mp3"), 30.0, 90.0)
        .unwrap();

    assert!(layer.plays as f64 * layer.source_duration >= 90.0);
    assert_eq!(layer.plays, 3);
    assert!((layer.duration - 90.0).abs() < EPS);
    assert!((layer.fade_in - 1.0).abs() < EPS);
    assert!((layer.fade_out - 1.0).abs() < EPS);
    assert!((layer.fade_out_start() - 89.0).abs() < EPS);
    assert!((layer.gain - 0.3).abs() < EPS);
}

fn long_shots() -> Vec<ShotSpan> {
    (0..6).map(|i| ShotSpan::new(i as f64 * 10.0, (i + 1) as f64 * 10.0)).collect()
}

fn blended_transitions() -> Vec<Transition> {
    vec![
        Transition::new(TransitionKind::Crossfade, 0.5),
        Transition::new(TransitionKind::SlideLeft, 0.6),
        Transition::cut(),
        Transition::new(TransitionKind::FadeBlack, 0.4),
        Transition::new(TransitionKind::ZoomIn, 0.6),
    ]
}

#[test]
fn test_overlap_equals_transition_duration() {
    let spans = long_shots();
    let targets = [4.0, 3.0, 5.0, 2.5, 4.5, 3.5];
    let plans = ShotPlan::zip(&spans, &targets, &blended_transitions());

    let timeline =
        TimelineCompositor::default().compose(RunId::new(), &plans, &[], &[], 60.0);

    assert_eq!(timeline.segments.len(), 6);
    for (overlap, next) in timeline.overlaps().iter().zip(&timeline.segments[1..]) {
        assert!(
            (overlap - next.transition.duration).abs() < 1e-6,
            "overlap {} vs transition {}",
            overlap,
            next.transition.duration
        );
    }
    for (seq, segment) in timeline.segments.iter().enumerate() {
        assert_eq!(segment.sequence as usize, seq);
        assert!(segment.placed_start >= 0.0);
        assert_eq!(segment.net_duration, targets[seq]);
    }
    let end = timeline.segments.last().unwrap().placed_end();
    assert!((timeline.total_duration - end).abs() < TIME_EPSILON);
    let net: f64 = targets.iter().sum();
    assert!((timeline.total_duration - net).abs() < 1e-6);
}

#[test]
fn test_continuous_speech_never_overlaps() {
    let spans = long_shots();
    let targets = [10.0, 10.0, 10.0, 10.0, 10.0, 10.0];
    let plans = ShotPlan::zip(&spans, &targets, &blended_transitions());
    let speech = [SpeechInterval::new(0.0, 60.0)];

    let timeline =
        TimelineCompositor::default().compose(RunId::new(), &plans, &[], &speech, 60.0);

    assert!(timeline.segments.iter().all(|s| !s.speech.is_empty()));
    assert_eq!(timeline.first_speech_collision(), None);
}

#[test]
fn test_beat_snapped_timeline_keeps_invariants() {
    let spans = long_shots();
    let targets = [4.0, 3.0, 5.0, 2.5, 4.5, 3.5];
    let plans = ShotPlan::zip(&spans, &targets, &blended_transitions());
    let beats: Vec<f64> = (1..120).map(|i| i as f64 * 0.52).collect();
    let speech = [SpeechInterval::new(2.0, 14.0), SpeechInterval::new(31.0, 48.0)];

    let timeline =
        TimelineCompositor::default().compose(RunId::new(), &plans, &beats, &speech, 60.0);

    assert!(!timeline.has_overlapping_speech());
    for segment in &timeline.segments {
        assert!((0.5..=2.0).contains(&segment.speed_factor));
        assert!(segment.placed_start >= 0.0);
    }
    for (overlap, next) in timeline.overlaps().iter().zip(&timeline.segments[1..]) {
        assert!((overlap - next.transition.duration).abs() < 1e-6);
    }
    let ends: Vec<f64> = timeline.segments.iter().map(|s| s.placed_end()).collect();
    for end in &ends {
        assert!(beats.iter().any(|b| (b - end).abs() < 1e-9), "{} is not on a beat", end);
    }
}

#[tokio::test]
#[ignore = "requires ffmpeg and ffprobe"]
async fn test_render_generated_footage() {
    use beatcut_engine::{AssemblyConfig, AssemblyPipeline, AssemblyRequest};

    let dir = tempfile::tempdir().unwrap();
    let video = dir.path().join("source.mp4");
    let track = dir.path().join("bgm.aac");

    let status = tokio::process::Command::new("ffmpeg")
        .args(["-y", "-v", "error"])
        .args(["-f", "lavfi", "-i", "testsrc=duration=6:size=160x90:rate=25"])
        .args(["-f", "lavfi", "-i", "sine=frequency=440:duration=6"])
        .args(["-shortest", "-pix_fmt", "yuv420p"])
        .arg(&video)
        .status()
        .await
        .unwrap();
    assert!(status.success());

    let status = tokio::process::Command::new("ffmpeg")
        .args(["-y", "-v", "error"])
        .args(["-f", "lavfi", "-i", "sine=frequency=220:duration=4"])
        .args(["-c:a", "aac"])
        .arg(&track)
        .status()
        .await
        .unwrap();
    assert!(status.success());

    let output = dir.path().join("out").join("final.mp4");
    let request = AssemblyRequest::new(&video, &output)
        .with_music(&track)
        .with_seed(1);

    let outcome = AssemblyPipeline::new(AssemblyConfig::default())
        .run(&request)
        .await
        .unwrap();

    assert_eq!(outcome.artifact.as_deref(), Some(output.as_path()));
    assert!(outcome.message.starts_with("Success.\nBackground: bgm.aac"));
    assert!(std::fs::metadata(&output).unwrap().len() > 0);
}
