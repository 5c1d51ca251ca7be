//! Background layer planning.

use std::path::Path;

use beatcut_models::BackgroundLayer;
use tracing::debug;

use crate::config::MixConfig;
use crate::error::{AssemblyError, AssemblyResult};

/// Lays the background track under the whole timeline.
///
/// The track is repeated until it covers the timeline, cut to the exact
/// timeline length, faded in at the start and out at the end, and scaled by
/// a fixed gain. Speech layers are summed on top without ducking.
#[derive(Debug, Clone, Default)]
pub struct AudioMixer {
    config: MixConfig,
}

impl AudioMixer {
    pub fn new(config: MixConfig) -> Self {
        Self { config }
    }

    pub fn plan_background(
        &self,
        track: &Path,
        track_duration: f64,
        timeline_duration: f64,
    ) -> AssemblyResult<BackgroundLayer> {
        if !(track_duration.is_finite() && track_duration > 0.0) {
            return Err(AssemblyError::missing_input(format!(
                "background track {} has no playable audio",
                track.display()
            )));
        }
        let total = timeline_duration.max(0.0);

        let plays = ((total / track_duration).ceil() as u32).max(1);
        let fade = self.config.fade_secs.min(total / 2.0);

        let layer = BackgroundLayer {
            path: track.to_path_buf(),
            source_duration: track_duration,
            plays,
            duration: total,
            fade_in: fade,
            fade_out: fade,
            gain: self.config.background_gain,
        };

        debug!(
            track = %track.display(),
            plays = layer.plays,
            duration = format!("{:.2}", total),
            "Background layer planned"
        );

        Ok(layer)
    }
}
