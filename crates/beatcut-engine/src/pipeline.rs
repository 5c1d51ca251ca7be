//! End-to-end assembly run.
//!
//! One run is a strict sequence: probe, segment, tag and transcribe, pick
//! the background, plan transitions and trims, compose, mix, render.
//! Missing input or music ends the run with a message instead of an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use beatcut_media::{
    probe_media, render_timeline, segment_video, BeatTracker, MediaInfo, OnsetBeatTracker,
};
use beatcut_models::{speech_intervals, CompositeTimeline, RunId, Shot, ShotSpan, SpeechInterval};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, Instrument};

use crate::collaborators::{NoSpeech, ShotTagger, Transcriber, UntaggedShots};
use crate::compositor::{ShotPlan, TimelineCompositor};
use crate::config::AssemblyConfig;
use crate::error::{AssemblyError, AssemblyResult};
use crate::logging::RunLogger;
use crate::mixer::AudioMixer;
use crate::music::MusicLibrary;
use crate::report::RunReport;
use crate::similarity::{LexicalSimilarity, TextSimilarity};
use crate::speech::SpeechIsolator;
use crate::transitions::TransitionPlanner;
use crate::trim::{TrimPolicy, VideoChangePoints};

/// Inputs of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyRequest {
    pub video: PathBuf,
    pub output: PathBuf,
    /// Folder of mood categories used for retrieval
    pub music_root: Option<PathBuf>,
    /// Explicit background track; wins over retrieval when it exists
    pub music_override: Option<PathBuf>,
    /// Seed for transition and music picks
    pub seed: Option<u64>,
    /// Stop after composing; nothing is rendered
    pub plan_only: bool,
}

impl AssemblyRequest {
    pub fn new(video: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            video: video.into(),
            output: output.into(),
            music_root: None,
            music_override: None,
            seed: None,
            plan_only: false,
        }
    }

    pub fn with_music_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.music_root = Some(root.into());
        self
    }

    pub fn with_music(mut self, track: impl Into<PathBuf>) -> Self {
        self.music_override = Some(track.into());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn plan_only(mut self) -> Self {
        self.plan_only = true;
        self
    }
}

/// Result of a run that did not fail outright.
///
/// An aborted run carries only a message.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub artifact: Option<PathBuf>,
    pub message: String,
    pub report: Option<RunReport>,
    pub timeline: Option<CompositeTimeline>,
}

impl PipelineOutcome {
    pub fn aborted(message: impl Into<String>) -> Self {
        Self {
            artifact: None,
            message: message.into(),
            report: None,
            timeline: None,
        }
    }

    /// Whether the run ended early without a timeline.
    pub fn is_aborted(&self) -> bool {
        self.report.is_none()
    }
}

/// The assembly engine with its collaborators.
pub struct AssemblyPipeline {
    config: AssemblyConfig,
    tagger: Arc<dyn ShotTagger>,
    transcriber: Arc<dyn Transcriber>,
    similarity: Arc<dyn TextSimilarity>,
    beat_tracker: Arc<dyn BeatTracker>,
}

impl AssemblyPipeline {
    /// Pipeline with no tagging, no speech, lexical similarity and the onset beat tracker.
    pub fn new(config: AssemblyConfig) -> Self {
        let beat_tracker = Arc::new(OnsetBeatTracker::new(config.beat_tracking.clone()));
        Self {
            config,
            tagger: Arc::new(UntaggedShots),
            transcriber: Arc::new(NoSpeech),
            similarity: Arc::new(LexicalSimilarity),
            beat_tracker,
        }
    }

    pub fn with_tagger(mut self, tagger: Arc<dyn ShotTagger>) -> Self {
        self.tagger = tagger;
        self
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = transcriber;
        self
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn TextSimilarity>) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn with_beat_tracker(mut self, beat_tracker: Arc<dyn BeatTracker>) -> Self {
        self.beat_tracker = beat_tracker;
        self
    }

    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    /// Run the pipeline once.
    ///
    /// Missing input and missing music come back as an aborted outcome;
    /// collaborator and render failures are errors.
    pub async fn run(&self, request: &AssemblyRequest) -> AssemblyResult<PipelineOutcome> {
        let run_id = RunId::new();
        let logger = RunLogger::new(&run_id, &request.video.display().to_string());
        let span = logger.create_span();

        let result = self.execute(run_id, &logger, request).instrument(span).await;

        match result {
            Ok(outcome) => {
                let label = if outcome.artifact.is_some() { "rendered" } else { "planned" };
                metrics::counter!("beatcut_runs_total", "outcome" => label).increment(1);
                logger.log_completion(&outcome.message.replace('\n', " | "));
                Ok(outcome)
            }
            Err(e) if e.is_pipeline_abort() => {
                metrics::counter!("beatcut_runs_total", "outcome" => "aborted").increment(1);
                logger.log_error(&e.to_string());
                Ok(PipelineOutcome::aborted(format!("Error: {}", e)))
            }
            Err(e) => {
                metrics::counter!("beatcut_runs_total", "outcome" => "failed").increment(1);
                logger.log_error(&e.to_string());
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        run_id: RunId,
        logger: &RunLogger,
        request: &AssemblyRequest,
    ) -> AssemblyResult<PipelineOutcome> {
        let started_at = Utc::now();
        logger.log_start(if request.plan_only { "plan only" } else { "full render" });

        let info = self.probe_source(&request.video).await?;
        let spans = self.segment(&request.video).await?;
        let source_duration = if info.duration > 0.0 {
            info.duration
        } else {
            spans.last().map_or(0.0, |s| s.end)
        };
        logger.log_stage("segment", &format!("{} shots over {:.2}s", spans.len(), source_duration));

        let (tagging, sentences) = tokio::join!(
            self.tagger.tag(&request.video, &spans),
            self.transcriber.transcribe(&request.video)
        );
        let tagging = tagging?.normalized();
        let speech = speech_intervals(&sentences?);
        if tagging.shots.is_empty() {
            return Err(AssemblyError::missing_input("tagger returned no shots"));
        }
        logger.log_stage(
            "tag",
            &format!("{} shots, {} speech intervals", tagging.shots.len(), speech.len()),
        );

        let mut rng = match request.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let background = self
            .select_background(request, &tagging.summary, &mut rng, logger)
            .await?;
        let track_info = probe_media(&background).await.map_err(|e| {
            logger.log_warning("music", &e.to_string());
            AssemblyError::NoMatchingMusic
        })?;
        if !track_info.has_audio {
            return Err(AssemblyError::NoMatchingMusic);
        }

        let fps = self.config.segmenter.resolve_fps(info.fps);
        let change_points =
            VideoChangePoints::new(&request.video, fps, self.config.segmenter.clone());
        let planner = TransitionPlanner::new(self.config.transitions.clone());

        let (transitions, targets, beats) = tokio::join!(
            planner.plan(&tagging.shots, self.similarity.as_ref(), &mut rng),
            self.trim_targets(&tagging.shots, &speech, &change_points),
            self.track_beats(&background, logger)
        );
        let transitions = transitions?;
        logger.log_stage(
            "plan",
            &format!("{} transitions, {} beats", transitions.len(), beats.len()),
        );

        let spans: Vec<ShotSpan> = tagging.shots.iter().map(Shot::span).collect();
        let plans = ShotPlan::zip(&spans, &targets, &transitions);
        let compositor = TimelineCompositor::new(
            self.config.compositor.clone(),
            self.config.beat_sync.clone(),
            SpeechIsolator::new(self.config.speech.clone()),
        );
        let timeline = compositor.compose(run_id, &plans, &beats, &speech, source_duration);
        if timeline.is_empty() {
            return Err(AssemblyError::missing_input("no shot could be placed on the timeline"));
        }
        logger.log_stage(
            "compose",
            &format!(
                "{} segments, {:.2}s",
                timeline.segments.len(),
                timeline.total_duration
            ),
        );

        let layer = AudioMixer::new(self.config.mix.clone()).plan_background(
            &background,
            track_info.duration,
            timeline.total_duration,
        )?;

        let mut report = RunReport::from_timeline(
            &timeline,
            background,
            tagging.summary.clone(),
            beats.len(),
            started_at,
        );

        if request.plan_only {
            return Ok(PipelineOutcome {
                artifact: None,
                message: report.summary(),
                report: Some(report),
                timeline: Some(timeline),
            });
        }

        if let Some(parent) = request.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        render_timeline(
            &request.video,
            &timeline,
            Some(&layer),
            &request.output,
            &self.config.render,
        )
        .await
        .map_err(|e| AssemblyError::fatal_render(e.to_string()))?;
        logger.log_stage("render", &request.output.display().to_string());

        report.finished_at = Utc::now();
        report = report.with_artifact(request.output.clone());

        Ok(PipelineOutcome {
            artifact: Some(request.output.clone()),
            message: report.summary(),
            report: Some(report),
            timeline: Some(timeline),
        })
    }

    async fn probe_source(&self, video: &Path) -> AssemblyResult<MediaInfo> {
        if !video.is_file() {
            return Err(AssemblyError::missing_file(video));
        }
        let info = probe_media(video).await.map_err(|e| {
            AssemblyError::missing_input(format!("cannot read {}: {}", video.display(), e))
        })?;
        if !info.has_video {
            return Err(AssemblyError::missing_input(format!(
                "{} has no video stream",
                video.display()
            )));
        }
        Ok(info)
    }

    async fn segment(&self, video: &Path) -> AssemblyResult<Vec<ShotSpan>> {
        let spans = segment_video(video, &self.config.segmenter)
            .await
            .map_err(|e| AssemblyError::missing_input(format!("segmentation failed: {}", e)))?;
        if spans.is_empty() {
            return Err(AssemblyError::missing_input("no shots detected"));
        }
        Ok(spans)
    }

    /// An existing override wins; otherwise retrieve from the library.
    async fn select_background<R: Rng>(
        &self,
        request: &AssemblyRequest,
        summary: &str,
        rng: &mut R,
        logger: &RunLogger,
    ) -> AssemblyResult<PathBuf> {
        if let Some(track) = &request.music_override {
            if track.is_file() {
                info!(track = %track.display(), "Using custom background track");
                return Ok(track.clone());
            }
            logger.log_warning(
                "music",
                &format!("custom track {} not found, using retrieval", track.display()),
            );
        }

        let Some(root) = &request.music_root else {
            return Err(AssemblyError::NoMatchingMusic);
        };
        let library = MusicLibrary::scan(root).await?;
        library
            .retrieve(summary, self.similarity.as_ref(), rng)
            .await?
            .ok_or(AssemblyError::NoMatchingMusic)
    }

    async fn trim_targets(
        &self,
        shots: &[Shot],
        speech: &[SpeechInterval],
        change_points: &VideoChangePoints,
    ) -> Vec<f64> {
        let policy = TrimPolicy::new(self.config.trim.clone());
        let mut targets = Vec::with_capacity(shots.len());
        for (i, shot) in shots.iter().enumerate() {
            let decision = policy
                .target_duration(i, shot.span(), speech, change_points)
                .await;
            targets.push(decision.duration());
        }
        targets
    }

    /// Beats of the background, or none when tracking fails.
    async fn track_beats(&self, track: &Path, logger: &RunLogger) -> Vec<f64> {
        match self.beat_tracker.track(track).await {
            Ok(beats) => beats,
            Err(e) => {
                let err = AssemblyError::beat_tracking(e.to_string());
                logger.log_warning("beats", &format!("{}, continuing without beat snapping", err));
                metrics::counter!("beatcut_beat_tracking_failures_total").increment(1);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = AssemblyRequest::new("in.mp4", "out/final.mp4")
            .with_music_root("music")
            .with_music("custom.mp3")
            .with_seed(7)
            .plan_only();

        assert_eq!(request.music_root, Some(PathBuf::from("music")));
        assert_eq!(request.music_override, Some(PathBuf::from("custom.mp3")));
        assert_eq!(request.seed, Some(7));
        assert!(request.plan_only);
    }

    #[tokio::test]
    async fn test_missing_video_aborts_with_message() {
        let pipeline = AssemblyPipeline::new(AssemblyConfig::default());
        let request = AssemblyRequest::new("/nonexistent/video.mp4", "/tmp/out.mp4");

        let outcome = pipeline.run(&request).await.unwrap();
        assert!(outcome.is_aborted());
        assert!(outcome.artifact.is_none());
        assert!(outcome.message.starts_with("Error: Missing input"));
    }

    #[tokio::test]
    async fn test_background_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        let track = dir.path().join("mine.mp3");
        std::fs::write(&track, b"x").unwrap();

        let pipeline = AssemblyPipeline::new(AssemblyConfig::default());
        let logger = RunLogger::new(&RunId::new(), "v.mp4");
        let request = AssemblyRequest::new("v.mp4", "o.mp4")
            .with_music(&track)
            .with_music_root(dir.path().join("missing"));

        let mut rng = StdRng::seed_from_u64(1);
        let picked = pipeline
            .select_background(&request, "happy", &mut rng, &logger)
            .await
            .unwrap();
        assert_eq!(picked, track);
    }

    #[tokio::test]
    async fn test_missing_override_falls_back_to_retrieval() {
        let dir = tempfile::tempdir().unwrap();
        let happy = dir.path().join("happy");
        std::fs::create_dir(&happy).unwrap();
        std::fs::write(happy.join("sun.mp3"), b"x").unwrap();

        let pipeline = AssemblyPipeline::new(AssemblyConfig::default());
        let logger = RunLogger::new(&RunId::new(), "v.mp4");
        let request = AssemblyRequest::new("v.mp4", "o.mp4")
            .with_music(dir.path().join("gone.mp3"))
            .with_music_root(dir.path());

        let mut rng = StdRng::seed_from_u64(1);
        let picked = pipeline
            .select_background(&request, "happy", &mut rng, &logger)
            .await
            .unwrap();
        assert_eq!(picked, happy.join("sun.mp3"));
    }

    #[tokio::test]
    async fn test_no_music_is_an_abort() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = AssemblyPipeline::new(AssemblyConfig::default());
        let logger = RunLogger::new(&RunId::new(), "v.mp4");
        let request = AssemblyRequest::new("v.mp4", "o.mp4").with_music_root(dir.path());

        let mut rng = StdRng::seed_from_u64(1);
        let err = pipeline
            .select_background(&request, "happy", &mut rng, &logger)
            .await
            .unwrap_err();
        assert!(matches!(err, AssemblyError::NoMatchingMusic));
        assert!(err.is_pipeline_abort());
    }

    #[tokio::test]
    async fn test_beat_tracking_failure_degrades_to_no_beats() {
        struct Deaf;

        #[async_trait::async_trait]
        impl BeatTracker for Deaf {
            async fn track(&self, _path: &Path) -> beatcut_media::MediaResult<Vec<f64>> {
                Err(beatcut_media::MediaError::beat_tracking("silent track"))
            }
        }

        let pipeline =
            AssemblyPipeline::new(AssemblyConfig::default()).with_beat_tracker(Arc::new(Deaf));
        let logger = RunLogger::new(&RunId::new(), "v.mp4");

        let beats = pipeline.track_beats(Path::new("bgm.mp3"), &logger).await;
        assert!(beats.is_empty());
    }
}
