//! Single-pass rendering of a composite timeline.

mod graph;

pub use graph::{build_filter_graph, xfade_name, FilterGraph, GraphInputs, AUDIO_OUT, VIDEO_OUT};

use std::path::Path;

use beatcut_models::{BackgroundLayer, CompositeTimeline};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_media;

/// Frame rate used when the source reports none.
const FALLBACK_FPS: f64 = 25.0;

/// Encoder settings for the final render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub video_codec: String,
    pub crf: u8,
    pub preset: String,
    pub audio_codec: String,
    pub audio_bitrate: String,

    /// Graphs longer than this are passed through `-filter_complex_script`.
    ///
    /// Long timelines with many speech clips easily exceed the command-line
    /// length limit of some platforms.
    pub max_inline_filter_len: usize,

    /// Kill FFmpeg after this many seconds.
    pub timeout_secs: Option<u64>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            crf: 20,
            preset: "medium".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
            max_inline_filter_len: 32_000,
            timeout_secs: None,
        }
    }
}

impl RenderConfig {
    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf;
        self
    }

    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }

    pub fn with_timeout(mut self, secs: Option<u64>) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Render `timeline` cut from `source`, mixed over `background`, into `output`.
pub async fn render_timeline(
    source: &Path,
    timeline: &CompositeTimeline,
    background: Option<&BackgroundLayer>,
    output: &Path,
    config: &RenderConfig,
) -> MediaResult<()> {
    let info = probe_media(source).await?;
    if !info.has_video {
        return Err(MediaError::invalid_media(format!(
            "{} has no video stream",
            source.display()
        )));
    }

    let graph = build_filter_graph(
        timeline,
        GraphInputs {
            fps: info.fps_or(FALLBACK_FPS),
            source_has_audio: info.has_audio,
            background,
        },
    )?;

    let mut cmd = FfmpegCommand::new(output).input(source);
    if let Some(bg) = background {
        cmd = cmd.input(&bg.path).stream_loop(bg.plays.saturating_sub(1));
    }

    // Keep the script file alive until FFmpeg exits
    let _script_file = if graph.script.len() > config.max_inline_filter_len {
        let file = NamedTempFile::new()?;
        tokio::fs::write(file.path(), &graph.script).await?;
        debug!(
            len = graph.script.len(),
            path = %file.path().display(),
            "Filter graph written to script file"
        );
        cmd = cmd.filter_complex_script(file.path());
        Some(file)
    } else {
        cmd = cmd.filter_complex(graph.script.clone());
        None
    };

    cmd = cmd.map(graph.video_out.clone());
    if let Some(audio) = &graph.audio_out {
        cmd = cmd
            .map(audio.clone())
            .audio_codec(&config.audio_codec)
            .audio_bitrate(&config.audio_bitrate);
    }
    cmd = cmd
        .video_codec(&config.video_codec)
        .preset(&config.preset)
        .crf(config.crf)
        .output_args(["-movflags", "+faststart"]);

    info!(
        run_id = %timeline.run_id,
        segments = timeline.segments.len(),
        duration = format!("{:.2}", timeline.total_duration),
        output = %output.display(),
        "Rendering composite timeline"
    );

    let total = timeline.total_duration;
    FfmpegRunner::new()
        .with_timeout(config.timeout_secs)
        .run_with_progress(&cmd, move |progress| {
            debug!(
                percent = format!("{:.0}", progress.fraction(total) * 100.0),
                speed = progress.speed,
                "Render progress"
            );
        })
        .await?;

    let written = tokio::fs::metadata(output).await.map(|m| m.len()).unwrap_or(0);
    if written == 0 {
        return Err(MediaError::ffmpeg_failed(
            format!("{} was not written", output.display()),
            None,
            None,
        ));
    }

    info!(output = %output.display(), bytes = written, "Render complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use beatcut_models::RunId;

    #[test]
    fn test_render_config_defaults() {
        let config = RenderConfig::default();
        assert_eq!(config.video_codec, "libx264");
        assert_eq!(config.crf, 20);
        assert_eq!(config.audio_bitrate, "192k");
        assert_eq!(config.timeout_secs, None);
    }

    #[test]
    fn test_render_config_partial_json() {
        let config: RenderConfig = serde_json::from_str(r#"{"crf": 18, "timeout_secs": 600}"#).unwrap();
        assert_eq!(config.crf, 18);
        assert_eq!(config.timeout_secs, Some(600));
        assert_eq!(config.preset, "medium");
    }

    #[tokio::test]
    async fn test_missing_source_is_reported() {
        let timeline = CompositeTimeline::new(RunId::new());
        let result = render_timeline(
            Path::new("/nonexistent/source.mp4"),
            &timeline,
            None,
            Path::new("/tmp/out.mp4"),
            &RenderConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }
}
