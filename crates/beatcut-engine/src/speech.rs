//! Per-shot speech isolation.

use beatcut_models::{SpeechClip, SpeechInterval, TimeSpan};

use crate::config::SpeechConfig;

/// Keeps a shot's own audio only where someone is speaking.
#[derive(Debug, Clone, Default)]
pub struct SpeechIsolator {
    config: SpeechConfig,
}

impl SpeechIsolator {
    pub fn new(config: SpeechConfig) -> Self {
        Self { config }
    }

    /// Audible windows of a segment cut from `trimmed` (source seconds) and
    /// played at `speed`.
    ///
    /// Windows are relative to the segment start, in output seconds, merged
    /// where speech intervals overlap, and faded at both ends. A shot with
    /// no overlapping speech yields no windows.
    pub fn isolate(&self, trimmed: TimeSpan, speed: f64, speech: &[SpeechInterval]) -> Vec<SpeechClip> {
        let speed = if speed > 0.0 { speed } else { 1.0 };

        let mut hits: Vec<(f64, f64)> = speech
            .iter()
            .filter_map(|s| s.intersect(trimmed.start, trimmed.end))
            .collect();
        hits.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut merged: Vec<(f64, f64)> = Vec::with_capacity(hits.len());
        for (start, end) in hits {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }

        merged
            .into_iter()
            .map(|(start, end)| {
                let start = (start - trimmed.start) / speed;
                let end = (end - trimmed.start) / speed;
                let fade = self.config.fade_secs.min((end - start) / 2.0);
                SpeechClip {
                    start,
                    end,
                    fade_in: fade,
                    fade_out: fade,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(start: f64, end: f64, fade: f64) -> SpeechClip {
        SpeechClip {
            start,
            end,
            fade_in: fade,
            fade_out: fade,
        }
    }

    #[test]
    fn test_silent_shot_has_no_clips() {
        let iso = SpeechIsolator::default();
        let clips = iso.isolate(TimeSpan::new(10.0, 15.0), 1.0, &[SpeechInterval::new(2.0, 4.0)]);
        assert!(clips.is_empty());
    }

    #[test]
    fn test_intersections_are_shot_relative() {
        let iso = SpeechIsolator::default();
        let speech = [
            SpeechInterval::new(8.0, 11.0),
            SpeechInterval::new(12.0, 13.0),
            SpeechInterval::new(14.5, 20.0),
        ];
        let clips = iso.isolate(TimeSpan::new(10.0, 15.0), 1.0, &speech);
        assert_eq!(
            clips,
            vec![clip(0.0, 1.0, 0.1), clip(2.0, 3.0, 0.1), clip(4.5, 5.0, 0.1)]
        );
    }

    #[test]
    fn test_overlapping_intervals_merge() {
        let iso = SpeechIsolator::default();
        let speech = [SpeechInterval::new(1.0, 3.0), SpeechInterval::new(2.0, 4.0)];
        let clips = iso.isolate(TimeSpan::new(0.0, 5.0), 1.0, &speech);
        assert_eq!(clips, vec![clip(1.0, 4.0, 0.1)]);
    }

    #[test]
    fn test_speed_scales_positions() {
        let iso = SpeechIsolator::default();
        let clips = iso.isolate(TimeSpan::new(0.0, 4.0), 2.0, &[SpeechInterval::new(1.0, 3.0)]);
        assert_eq!(clips, vec![clip(0.5, 1.5, 0.1)]);
    }

    #[test]
    fn test_fade_fits_short_clip() {
        let iso = SpeechIsolator::default();
        let clips = iso.isolate(TimeSpan::new(0.0, 4.0), 1.0, &[SpeechInterval::new(1.0, 1.1)]);
        assert_eq!(clips.len(), 1);
        assert!(clips[0].fade_in + clips[0].fade_out <= clips[0].duration() + 1e-12);
    }
}
