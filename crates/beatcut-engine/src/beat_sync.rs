//! Beat snapping of shot durations.

use crate::config::BeatSyncConfig;

/// Outcome of snapping one shot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatSnap {
    /// Net duration to place
    pub duration: f64,
    /// `target / duration`; 1.0 when no beat was used
    pub speed_factor: f64,
    /// The beat the shot now ends on
    pub beat: Option<f64>,
}

impl BeatSnap {
    fn identity(target: f64) -> Self {
        Self {
            duration: target,
            speed_factor: 1.0,
            beat: None,
        }
    }

    pub fn is_snapped(&self) -> bool {
        self.beat.is_some()
    }
}

/// Moves shot ends onto beats within a bounded speed change.
#[derive(Debug, Clone, Default)]
pub struct BeatSynchronizer {
    config: BeatSyncConfig,
}

impl BeatSynchronizer {
    pub fn new(config: BeatSyncConfig) -> Self {
        Self { config }
    }

    /// Snap `target` seconds starting at `cursor` to the beat nearest its natural end.
    ///
    /// Only beats more than `min_lead_secs` past the cursor qualify. The
    /// snapped duration is used only if `target / (beat - cursor)` is an
    /// allowed speed; otherwise `target` is returned unchanged.
    pub fn synchronize(&self, target: f64, cursor: f64, beats: &[f64]) -> BeatSnap {
        let natural_end = cursor + target;
        let earliest = cursor + self.config.min_lead_secs;

        let mut nearest: Option<f64> = None;
        for &beat in beats.iter().filter(|&&b| b > earliest) {
            let closer = nearest.map_or(true, |n| (beat - natural_end).abs() < (n - natural_end).abs());
            if closer {
                nearest = Some(beat);
            }
        }

        let Some(beat) = nearest else {
            return BeatSnap::identity(target);
        };

        let implied = beat - cursor;
        let speed = target / implied;
        if self.config.accepts(speed) {
            BeatSnap {
                duration: implied,
                speed_factor: speed,
                beat: Some(beat),
            }
        } else {
            BeatSnap::identity(target)
        }
    }
}
