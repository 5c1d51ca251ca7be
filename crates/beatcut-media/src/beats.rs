//! Onset-based beat tracking.
//!
//! # Algorithm
//!
//! 1. Decode the background track to mono PCM (first `analysis_window_secs`)
//! 2. STFT (2048-sample Hann window, 512-sample hop, centered frames)
//! 3. Log-compressed magnitude, spectral flux with half-wave rectification
//! 4. Remove the local mean and scale to unit standard deviation
//! 5. Tempo: autocorrelation of the smoothed envelope, weighted by a
//!    log-normal prior around 120 BPM, restricted to `[min_bpm, max_bpm]`
//! 6. Beats: dynamic programming that rewards onset strength and penalizes
//!    inter-beat intervals that deviate from the tempo period

use std::f64::consts::PI;
use std::path::Path;

use async_trait::async_trait;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::audio::decode_mono_pcm;
use crate::error::{MediaError, MediaResult};

/// STFT window size in samples.
const N_FFT: usize = 2048;
/// STFT hop in samples.
const HOP: usize = 512;
/// Half-width of the moving average removed from the onset envelope, in frames.
const DETREND_RADIUS: usize = 8;
/// Tempo prior center.
const PRIOR_BPM: f64 = 120.0;
/// Weight of deviations from the tempo period in beat placement.
const TIGHTNESS: f64 = 100.0;

/// Beat tracking settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatTrackingConfig {
    /// Only the first part of the track is analyzed.
    pub analysis_window_secs: f64,
    /// Analysis sample rate in Hz.
    pub sample_rate: u32,
    /// Slowest tempo considered.
    pub min_bpm: f64,
    /// Fastest tempo considered.
    pub max_bpm: f64,
}

impl Default for BeatTrackingConfig {
    fn default() -> Self {
        Self {
            analysis_window_secs: 180.0,
            sample_rate: 22050,
            min_bpm: 60.0,
            max_bpm: 200.0,
        }
    }
}

impl BeatTrackingConfig {
    pub fn with_analysis_window(mut self, secs: f64) -> Self {
        self.analysis_window_secs = secs;
        self
    }

    pub fn with_bpm_range(mut self, min_bpm: f64, max_bpm: f64) -> Self {
        self.min_bpm = min_bpm;
        self.max_bpm = max_bpm;
        self
    }
}

/// Extracts beat timestamps from audio files.
#[async_trait]
pub trait BeatTracker: Send + Sync {
    /// Ascending beat times in seconds.
    async fn track(&self, path: &Path) -> MediaResult<Vec<f64>>;
}

/// FFmpeg-decoded, spectral-flux beat tracker.
#[derive(Debug, Clone, Default)]
pub struct OnsetBeatTracker {
    config: BeatTrackingConfig,
}

impl OnsetBeatTracker {
    pub fn new(config: BeatTrackingConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BeatTracker for OnsetBeatTracker {
    async fn track(&self, path: &Path) -> MediaResult<Vec<f64>> {
        let samples = decode_mono_pcm(
            path,
            self.config.sample_rate,
            Some(self.config.analysis_window_secs),
        )
        .await
        .map_err(|e| MediaError::beat_tracking(format!("decode failed: {}", e)))?;

        let analyzer = BeatAnalyzer::new(&self.config);
        let beats = tokio::task::spawn_blocking(move || analyzer.beats(&samples))
            .await
            .map_err(|e| MediaError::beat_tracking(format!("analysis task failed: {}", e)))??;

        info!(
            path = %path.display(),
            beats = beats.len(),
            "Beat tracking complete"
        );
        Ok(beats)
    }
}

/// Pure beat analysis over decoded samples.
#[derive(Debug, Clone)]
pub struct BeatAnalyzer {
    sample_rate: f64,
    min_bpm: f64,
    max_bpm: f64,
}

impl BeatAnalyzer {
    pub fn new(config: &BeatTrackingConfig) -> Self {
        Self {
            sample_rate: config.sample_rate as f64,
            min_bpm: config.min_bpm,
            max_bpm: config.max_bpm,
        }
    }

    /// Envelope frames per second.
    pub fn frame_rate(&self) -> f64 {
        self.sample_rate / HOP as f64
    }

    /// Beat times in seconds.
    pub fn beats(&self, samples: &[f32]) -> MediaResult<Vec<f64>> {
        let envelope = self.onset_envelope(samples)?;
        let period = self.estimate_period(&envelope)?;

        debug!(
            frames = envelope.len(),
            bpm = format!("{:.1}", 60.0 * self.frame_rate() / period),
            "Estimated tempo"
        );

        let frames = place_beats(&envelope, period);
        let frame_rate = self.frame_rate();
        Ok(frames.into_iter().map(|f| f as f64 / frame_rate).collect())
    }

    /// Tempo in beats per minute.
    pub fn tempo(&self, samples: &[f32]) -> MediaResult<f64> {
        let envelope = self.onset_envelope(samples)?;
        let period = self.estimate_period(&envelope)?;
        Ok(60.0 * self.frame_rate() / period)
    }

    /// Detrended, unit-variance spectral flux envelope.
    pub fn onset_envelope(&self, samples: &[f32]) -> MediaResult<Vec<f64>> {
        let spectrogram = log_spectrogram(samples);
        if spectrogram.len() < 2 {
            return Err(MediaError::beat_tracking("audio too short for analysis"));
        }

        let mut flux = vec![0.0; spectrogram.len()];
        for t in 1..spectrogram.len() {
            flux[t] = spectrogram[t]
                .iter()
                .zip(&spectrogram[t - 1])
                .map(|(cur, prev)| (cur - prev).max(0.0))
                .sum();
        }

        let mut envelope: Vec<f64> = flux
            .iter()
            .enumerate()
            .map(|(t, v)| {
                let lo = t.saturating_sub(DETREND_RADIUS);
                let hi = (t + DETREND_RADIUS + 1).min(flux.len());
                let mean = flux[lo..hi].iter().sum::<f64>() / (hi - lo) as f64;
                (v - mean).max(0.0)
            })
            .collect();

        let n = envelope.len() as f64;
        let mean = envelope.iter().sum::<f64>() / n;
        let std = (envelope.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
        if std <= 1e-9 {
            return Err(MediaError::beat_tracking("no onsets detected"));
        }
        envelope.iter_mut().for_each(|v| *v /= std);

        Ok(envelope)
    }

    /// Beat period in envelope frames.
    fn estimate_period(&self, envelope: &[f64]) -> MediaResult<f64> {
        let frame_rate = self.frame_rate();
        let min_lag = ((60.0 * frame_rate / self.max_bpm).floor() as usize).max(1);
        let max_lag = (60.0 * frame_rate / self.min_bpm).ceil() as usize;

        if min_lag >= max_lag || envelope.len() <= 2 * max_lag + 1 {
            return Err(MediaError::beat_tracking("audio too short for tempo estimation"));
        }

        let smoothed = smooth(envelope);
        let ac = autocorrelation(&smoothed, 2 * max_lag + 2);

        let score = |lag: usize| {
            let bpm = 60.0 * frame_rate / lag as f64;
            let weight = (-0.5 * (bpm / PRIOR_BPM).log2().powi(2)).exp();
            weight * (ac[lag] + 0.5 * ac[2 * lag])
        };

        let mut best = min_lag;
        let mut best_score = f64::NEG_INFINITY;
        for lag in min_lag..=max_lag {
            let s = score(lag);
            if s > best_score {
                best = lag;
                best_score = s;
            }
        }

        if best_score <= 0.0 {
            return Err(MediaError::beat_tracking("no periodicity found"));
        }

        // Parabolic refinement between neighbouring lags
        let mut period = best as f64;
        if best > min_lag && best < max_lag {
            let (a, b, c) = (score(best - 1), best_score, score(best + 1));
            let denom = a - 2.0 * b + c;
            if denom.abs() > 1e-12 {
                period += (0.5 * (a - c) / denom).clamp(-0.5, 0.5);
            }
        }

        Ok(period)
    }
}

/// Log-magnitude STFT frames of centered, Hann-windowed blocks.
fn log_spectrogram(samples: &[f32]) -> Vec<Vec<f64>> {
    if samples.is_empty() {
        return Vec::new();
    }

    let pad = N_FFT / 2;
    let mut padded = vec![0.0f64; samples.len() + 2 * pad];
    for (dst, src) in padded[pad..].iter_mut().zip(samples) {
        *dst = *src as f64;
    }

    if padded.len() < N_FFT {
        return Vec::new();
    }
    let num_frames = (padded.len() - N_FFT) / HOP + 1;
    let num_bins = N_FFT / 2 + 1;

    let window: Vec<f64> = (0..N_FFT)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / N_FFT as f64).cos()))
        .collect();

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(N_FFT);
    let mut buffer = vec![Complex::new(0.0, 0.0); N_FFT];

    (0..num_frames)
        .map(|frame| {
            let start = frame * HOP;
            for ((slot, &s), &w) in buffer
                .iter_mut()
                .zip(&padded[start..start + N_FFT])
                .zip(&window)
            {
                *slot = Complex::new(s * w, 0.0);
            }
            fft.process(&mut buffer);
            buffer[..num_bins]
                .iter()
                .map(|c| (1.0 + 100.0 * c.norm()).ln())
                .collect()
        })
        .collect()
}

/// Triangular 5-tap smoothing.
fn smooth(envelope: &[f64]) -> Vec<f64> {
    const TAPS: [f64; 5] = [1.0, 2.0, 3.0, 2.0, 1.0];
    let norm: f64 = TAPS.iter().sum();

    (0..envelope.len())
        .map(|t| {
            TAPS.iter()
                .enumerate()
                .filter_map(|(k, w)| {
                    let idx = (t + k).checked_sub(2)?;
                    envelope.get(idx).map(|v| v * w)
                })
                .sum::<f64>()
                / norm
        })
        .collect()
}

/// Mean-removed autocorrelation for lags `0..max_lag`.
fn autocorrelation(envelope: &[f64], max_lag: usize) -> Vec<f64> {
    let n = envelope.len();
    let mean = envelope.iter().sum::<f64>() / n as f64;
    let centered: Vec<f64> = envelope.iter().map(|v| v - mean).collect();

    (0..max_lag)
        .map(|lag| {
            if lag >= n {
                return 0.0;
            }
            centered[..n - lag]
                .iter()
                .zip(&centered[lag..])
                .map(|(a, b)| a * b)
                .sum::<f64>()
                / n as f64
        })
        .collect()
}

/// Dynamic-programming beat placement. Returns ascending frame indices.
fn place_beats(envelope: &[f64], period: f64) -> Vec<usize> {
    let n = envelope.len();
    if n == 0 || period <= 0.0 {
        return Vec::new();
    }

    let mut score = vec![0.0; n];
    let mut backlink: Vec<Option<usize>> = vec![None; n];

    let near = (period / 2.0).round().max(1.0) as usize;
    let far = (2.0 * period).round() as usize;

    for t in 0..n {
        let mut best: Option<(usize, f64)> = None;
        if t >= near {
            let lo = t.saturating_sub(far);
            for prev in lo..=t - near {
                let interval = (t - prev) as f64 / period;
                let candidate = score[prev] - TIGHTNESS * interval.ln().powi(2);
                if best.map_or(true, |(_, s)| candidate > s) {
                    best = Some((prev, candidate));
                }
            }
        }

        match best {
            Some((prev, s)) if s > 0.0 => {
                score[t] = envelope[t] + s;
                backlink[t] = Some(prev);
            }
            _ => score[t] = envelope[t],
        }
    }

    // Last beat: best score within the final period
    let tail_start = n.saturating_sub(period.ceil() as usize);
    let mut t = (tail_start..n)
        .max_by(|&a, &b| score[a].total_cmp(&score[b]))
        .unwrap_or(n - 1);

    let mut beats = vec![t];
    while let Some(prev) = backlink[t] {
        beats.push(prev);
        t = prev;
    }
    beats.reverse();

    trim_weak_edges(envelope, beats)
}

/// Drop leading and trailing beats whose onset strength is weak relative to the rest.
fn trim_weak_edges(envelope: &[f64], beats: Vec<usize>) -> Vec<usize> {
    if beats.is_empty() {
        return beats;
    }
    let mean = beats.iter().map(|&b| envelope[b]).sum::<f64>() / beats.len() as f64;
    let threshold = 0.5 * mean;

    let first = beats.iter().position(|&b| envelope[b] >= threshold);
    let last = beats.iter().rposition(|&b| envelope[b] >= threshold);
    match (first, last) {
        (Some(first), Some(last)) => beats[first..=last].to_vec(),
        _ => beats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: usize = 22050;

    /// Short decaying noise bursts every `interval` seconds.
    fn click_track(secs: f64, interval: f64, offset: f64) -> Vec<f32> {
        let mut samples = vec![0.0f32; (secs * SR as f64) as usize];
        let mut seed: u32 = 0x1234_5678;
        let mut at = offset;
        while at < secs {
            let start = (at * SR as f64) as usize;
            for i in 0..256 {
                if let Some(s) = samples.get_mut(start + i) {
                    seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                    let noise = (seed >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0;
                    *s = noise * (1.0 - i as f32 / 256.0);
                }
            }
            at += interval;
        }
        samples
    }

    fn median_interval(beats: &[f64]) -> f64 {
        let mut intervals: Vec<f64> = beats.windows(2).map(|w| w[1] - w[0]).collect();
        intervals.sort_by(|a, b| a.total_cmp(b));
        intervals[intervals.len() / 2]
    }

    #[test]
    fn test_click_track_at_120_bpm() {
        let analyzer = BeatAnalyzer::new(&BeatTrackingConfig::default());
        let beats = analyzer.beats(&click_track(10.0, 0.5, 0.25)).unwrap();

        assert!(beats.len() >= 15, "only {} beats", beats.len());
        assert!(beats.windows(2).all(|w| w[0] < w[1]));

        let median = median_interval(&beats);
        assert!((0.45..=0.55).contains(&median), "median interval {}", median);
    }

    #[test]
    fn test_tempo_within_range() {
        let analyzer = BeatAnalyzer::new(&BeatTrackingConfig::default());
        let bpm = analyzer.tempo(&click_track(12.0, 0.75, 0.1)).unwrap();
        assert!((70.0..=90.0).contains(&bpm), "bpm {}", bpm);
    }

    #[test]
    fn test_silence_fails() {
        let analyzer = BeatAnalyzer::new(&BeatTrackingConfig::default());
        let result = analyzer.beats(&vec![0.0; SR * 5]);
        assert!(matches!(result, Err(MediaError::BeatTracking(_))));
    }

    #[test]
    fn test_too_short_fails() {
        let analyzer = BeatAnalyzer::new(&BeatTrackingConfig::default());
        assert!(analyzer.beats(&[]).is_err());
        assert!(analyzer.beats(&click_track(0.5, 0.25, 0.0)).is_err());
    }

    #[test]
    fn test_place_beats_on_impulses() {
        let mut envelope = vec![0.0; 200];
        for t in (5..200).step_by(20) {
            envelope[t] = 1.0;
        }
        let beats = place_beats(&envelope, 20.0);
        let expected: Vec<usize> = (5..200).step_by(20).collect();
        assert_eq!(beats, expected);
    }

    #[test]
    fn test_smooth_preserves_mass_in_interior() {
        let mut envelope = vec![0.0; 11];
        envelope[5] = 9.0;
        let smoothed = smooth(&envelope);
        assert!((smoothed.iter().sum::<f64>() - 9.0).abs() < 1e-9);
        assert!((smoothed[5] - 3.0).abs() < 1e-9);
    }
}
