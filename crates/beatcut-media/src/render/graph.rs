//! Filter graph construction for a composite timeline.
//!
//! Input 0 is the source video; input 1, when present, is the background
//! track (already looped on the command line with `-stream_loop`).

use std::fmt::Write as _;

use beatcut_models::{BackgroundLayer, CompositeTimeline, TimelineSegment, TransitionKind, TIME_EPSILON};

use crate::error::{MediaError, MediaResult};

/// Output label of the video chain.
pub const VIDEO_OUT: &str = "[vout]";
/// Output label of the mixed audio.
pub const AUDIO_OUT: &str = "[aout]";

/// A complete `-filter_complex` graph and its output labels.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterGraph {
    /// Filter chains separated by `;`
    pub script: String,
    /// Label to map as the video stream
    pub video_out: String,
    /// Label to map as the audio stream, if any layer is audible
    pub audio_out: Option<String>,
}

/// What the graph may read besides the timeline.
#[derive(Debug, Clone, Copy)]
pub struct GraphInputs<'a> {
    /// Frame rate every segment is normalized to
    pub fps: f64,
    /// Whether input 0 carries an audio stream
    pub source_has_audio: bool,
    /// Background layer read from input 1
    pub background: Option<&'a BackgroundLayer>,
}

/// FFmpeg `xfade` effect for a transition kind. Cuts have none.
pub fn xfade_name(kind: TransitionKind) -> Option<&'static str> {
    match kind {
        TransitionKind::Cut => None,
        TransitionKind::Crossfade => Some("fade"),
        TransitionKind::FadeBlack => Some("fadeblack"),
        TransitionKind::SlideLeft => Some("slideleft"),
        TransitionKind::SlideUp => Some("slideup"),
        TransitionKind::ZoomIn => Some("zoomin"),
        TransitionKind::Glitch => Some("pixelize"),
    }
}

/// Build the filter graph for `timeline`.
pub fn build_filter_graph(
    timeline: &CompositeTimeline,
    inputs: GraphInputs<'_>,
) -> MediaResult<FilterGraph> {
    if timeline.is_empty() {
        return Err(MediaError::invalid_timeline("no segments to render"));
    }
    if !(inputs.fps.is_finite() && inputs.fps > 0.0) {
        return Err(MediaError::invalid_timeline("output frame rate must be positive"));
    }

    let mut chains: Vec<String> = Vec::new();

    for seg in &timeline.segments {
        chains.push(video_chain(seg, inputs.fps));
    }
    chains.extend(join_chains(&timeline.segments));

    let mut layers: Vec<String> = Vec::new();

    if let Some(bg) = inputs.background {
        chains.push(background_chain(bg));
        layers.push("[bg]".to_string());
    }

    if inputs.source_has_audio {
        for seg in &timeline.segments {
            for (idx, chain) in speech_chains(seg) {
                chains.push(chain);
                layers.push(format!("[s{}_{}]", seg.sequence, idx));
            }
        }
    }

    let audio_out = if layers.is_empty() {
        None
    } else {
        // Background is first so duration=first ends the mix with the timeline
        let duration = if inputs.background.is_some() { "first" } else { "longest" };
        chains.push(format!(
            "{}amix=inputs={}:normalize=0:duration={}{}",
            layers.concat(),
            layers.len(),
            duration,
            AUDIO_OUT
        ));
        Some(AUDIO_OUT.to_string())
    };

    Ok(FilterGraph {
        script: chains.join(";\n"),
        video_out: VIDEO_OUT.to_string(),
        audio_out,
    })
}

fn video_label(seg: &TimelineSegment) -> String {
    format!("[v{}]", seg.sequence)
}

fn video_chain(seg: &TimelineSegment, fps: f64) -> String {
    let mut chain = format!(
        "[0:v]trim=start={:.3}:end={:.3},setpts=PTS-STARTPTS",
        seg.trimmed.start, seg.trimmed.end
    );
    if (seg.speed_factor - 1.0).abs() > TIME_EPSILON {
        let _ = write!(chain, ",setpts=PTS/{:.6}", seg.speed_factor);
    }
    let _ = write!(chain, ",fps={},format=yuv420p,settb=AVTB{}", fps, video_label(seg));
    chain
}

/// Pairwise joins: `xfade` for blends, `concat` for cuts.
fn join_chains(segments: &[TimelineSegment]) -> Vec<String> {
    let mut chains = Vec::new();
    let Some(first) = segments.first() else {
        return chains;
    };

    if segments.len() == 1 {
        chains.push(format!("{}null{}", video_label(first), VIDEO_OUT));
        return chains;
    }

    let mut acc = video_label(first);
    for (i, seg) in segments.iter().enumerate().skip(1) {
        let out = if i + 1 == segments.len() {
            VIDEO_OUT.to_string()
        } else {
            format!("[x{}]", seg.sequence)
        };

        let blend = xfade_name(seg.transition.kind)
            .filter(|_| seg.transition.duration > TIME_EPSILON);

        let chain = match blend {
            Some(effect) => format!(
                "{}{}xfade=transition={}:duration={:.3}:offset={:.3}{}",
                acc,
                video_label(seg),
                effect,
                seg.transition.duration,
                seg.placed_start,
                out
            ),
            None => format!("{}{}concat=n=2:v=1:a=0{}", acc, video_label(seg), out),
        };
        chains.push(chain);
        acc = out;
    }

    chains
}

/// One chain per audible speech clip, delayed to its absolute position.
fn speech_chains(seg: &TimelineSegment) -> Vec<(usize, String)> {
    seg.speech
        .iter()
        .enumerate()
        .filter(|(_, clip)| clip.duration() > TIME_EPSILON)
        .map(|(idx, clip)| {
            let src_start = seg.source_time(clip.start);
            let src_end = seg.source_time(clip.end);
            let length = clip.duration();

            let mut chain = format!(
                "[0:a]atrim=start={:.3}:end={:.3},asetpts=PTS-STARTPTS",
                src_start, src_end
            );
            if (seg.speed_factor - 1.0).abs() > TIME_EPSILON {
                let _ = write!(chain, ",atempo={:.6}", seg.speed_factor);
            }
            if clip.fade_in > 0.0 {
                let _ = write!(chain, ",afade=t=in:st=0:d={:.3}", clip.fade_in);
            }
            if clip.fade_out > 0.0 {
                let _ = write!(
                    chain,
                    ",afade=t=out:st={:.3}:d={:.3}",
                    (length - clip.fade_out).max(0.0),
                    clip.fade_out
                );
            }
            let delay_ms = ((seg.placed_start + clip.start) * 1000.0).round().max(0.0) as u64;
            let _ = write!(
                chain,
                ",adelay=delays={}:all=1[s{}_{}]",
                delay_ms, seg.sequence, idx
            );
            (idx, chain)
        })
        .collect()
}

fn background_chain(bg: &BackgroundLayer) -> String {
    let mut chain = format!("[1:a]atrim=start=0:end={:.3},asetpts=PTS-STARTPTS", bg.duration);
    if bg.fade_in > 0.0 {
        let _ = write!(chain, ",afade=t=in:st=0:d={:.3}", bg.fade_in);
    }
    if bg.fade_out > 0.0 {
        let _ = write!(
            chain,
            ",afade=t=out:st={:.3}:d={:.3}",
            bg.fade_out_start(),
            bg.fade_out
        );
    }
    let _ = write!(chain, ",volume={:.3}[bg]", bg.gain);
    chain
}
