//! Hue histograms and histogram correlation.
//!
//! Frames are compared on the hue channel only. Hue is quantized over
//! `[0, 360)` degrees, the histogram is min-max normalized to `[0, 1]`,
//! and two histograms are compared with the Pearson correlation of their
//! bins (1 = identical distribution, values near 0 or below = unrelated).

use image::RgbImage;

/// A min-max normalized hue histogram of one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct HueHistogram {
    bins: Vec<f64>,
}

impl HueHistogram {
    /// Compute from packed RGB24 pixel data.
    ///
    /// Trailing bytes that do not form a full pixel are ignored.
    pub fn from_rgb(rgb_data: &[u8], bins: usize) -> Self {
        let bins = bins.max(1);
        let mut counts = vec![0.0; bins];

        for px in rgb_data.chunks_exact(3) {
            let hue = rgb_to_hue(px[0], px[1], px[2]);
            let bin = ((hue / 360.0) * bins as f64) as usize;
            counts[bin.min(bins - 1)] += 1.0;
        }

        let mut hist = Self { bins: counts };
        hist.normalize_min_max();
        hist
    }

    /// Compute from a decoded frame.
    pub fn from_image(frame: &RgbImage, bins: usize) -> Self {
        Self::from_rgb(frame.as_raw(), bins)
    }

    pub fn bins(&self) -> &[f64] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Correlation with another histogram.
    pub fn correlation(&self, other: &HueHistogram) -> f64 {
        correlation(&self.bins, &other.bins)
    }

    fn normalize_min_max(&mut self) {
        let min = self.bins.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.bins.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;

        if range > f64::EPSILON {
            for v in &mut self.bins {
                *v = (*v - min) / range;
            }
        } else {
            // Flat histogram maps to the lower bound
            self.bins.iter_mut().for_each(|v| *v = 0.0);
        }
    }
}

/// Pearson correlation between two equally sized histograms.
///
/// Returns 1.0 when either histogram has no variance, and 0.0 when the
/// lengths differ.
pub fn correlation(h1: &[f64], h2: &[f64]) -> f64 {
    if h1.len() != h2.len() || h1.is_empty() {
        return 0.0;
    }

    let n = h1.len() as f64;
    let mean1 = h1.iter().sum::<f64>() / n;
    let mean2 = h2.iter().sum::<f64>() / n;

    let mut num = 0.0;
    let mut var1 = 0.0;
    let mut var2 = 0.0;
    for (a, b) in h1.iter().zip(h2) {
        let da = a - mean1;
        let db = b - mean2;
        num += da * db;
        var1 += da * da;
        var2 += db * db;
    }

    let denom = var1 * var2;
    if denom.abs() > f64::EPSILON {
        num / denom.sqrt()
    } else {
        1.0
    }
}

/// Hue of an RGB pixel in degrees `[0, 360)`. Achromatic pixels have hue 0.
fn rgb_to_hue(r: u8, g: u8, b: u8) -> f64 {
    let r = r as f64 / 255.0;
    let g = g as f64 / 255.0;
    let b = b as f64 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    if delta <= 0.0 {
        return 0.0;
    }

    let h = if max == r {
        60.0 * (((g - b) / delta) % 6.0)
    } else if max == g {
        60.0 * (((b - r) / delta) + 2.0)
    } else {
        60.0 * (((r - g) / delta) + 4.0)
    };

    if h < 0.0 {
        h + 360.0
    } else {
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(color: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(16, 9, Rgb(color))
    }

    fn split(left: [u8; 3], right: [u8; 3]) -> RgbImage {
        RgbImage::from_fn(16, 9, |x, _| if x < 8 { Rgb(left) } else { Rgb(right) })
    }

    #[test]
    fn test_rgb_to_hue() {
        assert_eq!(rgb_to_hue(255, 0, 0), 0.0);
        assert!((rgb_to_hue(0, 255, 0) - 120.0).abs() < 1e-9);
        assert!((rgb_to_hue(0, 0, 255) - 240.0).abs() < 1e-9);
        assert!((rgb_to_hue(255, 0, 255) - 300.0).abs() < 1e-9);
        assert_eq!(rgb_to_hue(128, 128, 128), 0.0);
    }

    #[test]
    fn test_histogram_is_min_max_normalized() {
        let hist = HueHistogram::from_image(&split([0, 255, 0], [0, 0, 255]), 180);
        assert_eq!(hist.len(), 180);
        assert_eq!(hist.bins()[60], 1.0);
        assert_eq!(hist.bins()[120], 1.0);
        assert!(hist.bins().iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(hist.bins()[0], 0.0);
    }

    #[test]
    fn test_identical_frames_correlate_fully() {
        let a = HueHistogram::from_image(&split([0, 255, 0], [255, 0, 0]), 180);
        let b = HueHistogram::from_image(&split([0, 255, 0], [255, 0, 0]), 180);
        assert!((a.correlation(&b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_different_hues_correlate_poorly() {
        let green = HueHistogram::from_image(&solid([0, 255, 0]), 180);
        let blue = HueHistogram::from_image(&solid([0, 0, 255]), 180);
        assert!(green.correlation(&blue) < 0.7);
    }

    #[test]
    fn test_correlation_edge_cases() {
        assert_eq!(correlation(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(correlation(&[0.5, 0.5], &[0.2, 0.9]), 1.0);
    }
}
