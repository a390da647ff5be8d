//! Fixed-centroid brightness strategy.
//!
//! Averages luminance over a small square patch at each of the nine
//! calibrated LED centres and compares the mean against one threshold.
//! The power LED is checked first and gates the rest: an unlit power
//! LED means the panel is off or the image is unreadable.

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::config::{CentroidConfig, LedCentroid};
use crate::decode::{DecodeFailure, DecodeOutcome};
use crate::types::{LED_COUNT, LED_NAMES, SIGNAL_COUNT, ZoneStatus};

/// Mean patch luminance for every LED, in centroid-table order.
///
/// Exposed so a deployment can pick a threshold from real frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LedMeasurements {
    /// Mean luminance (0-255) per LED, power first.
    pub means: [f32; LED_COUNT],
}

impl LedMeasurements {
    /// Mean luminance of the power LED patch.
    #[must_use]
    pub const fn power(&self) -> f32 {
        self.means[0]
    }

    /// `(name, mean)` pairs in centroid-table order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f32)> + '_ {
        LED_NAMES.into_iter().zip(self.means.iter().copied())
    }

    /// Apply the threshold: power gate first, then each zone signal
    /// independently.
    #[must_use]
    pub fn classify(&self, threshold: f32) -> DecodeOutcome {
        if !is_lit(self.power(), threshold) {
            return DecodeOutcome::Failed(DecodeFailure::PowerLedUnlit);
        }
        let mut signals = [false; SIGNAL_COUNT];
        for (signal, &mean) in signals.iter_mut().zip(&self.means[1..]) {
            *signal = is_lit(mean, threshold);
        }
        DecodeOutcome::Decoded(ZoneStatus::from_signals(signals))
    }
}

/// A patch counts as lit when its mean is not below the threshold.
fn is_lit(mean: f32, threshold: f32) -> bool {
    mean >= threshold
}

/// Measure every LED patch in a cropped luminance image.
///
/// Patches are clipped to the image, so an unvalidated centroid yields a
/// mean over fewer pixels (or 0.0 when entirely outside) rather than a
/// panic. [`CentroidConfig::validate`] rules that case out in practice.
#[must_use = "returns the per-LED measurements"]
pub fn measure(gray: &GrayImage, config: &CentroidConfig) -> LedMeasurements {
    let mut means = [0.0; LED_COUNT];
    for (mean, centroid) in means.iter_mut().zip(&config.centroids) {
        *mean = patch_mean(gray, *centroid, config.window);
    }
    LedMeasurements { means }
}

/// Decode a cropped region with the fixed-centroid strategy.
#[must_use = "returns the decode outcome"]
pub fn read(gray: &GrayImage, config: &CentroidConfig) -> DecodeOutcome {
    measure(gray, config).classify(config.threshold)
}

/// Mean luminance of the `(2 * window + 1)` square centred on `centroid`.
#[allow(clippy::cast_precision_loss)]
fn patch_mean(gray: &GrayImage, centroid: LedCentroid, window: u32) -> f32 {
    let rows = centroid.row.saturating_sub(window)..=centroid.row.saturating_add(window);
    let cols = centroid.col.saturating_sub(window)..=centroid.col.saturating_add(window);

    let mut sum: u64 = 0;
    let mut count: u64 = 0;
    for y in rows {
        for x in cols.clone() {
            if let Some(pixel) = gray.get_pixel_checked(x, y) {
                sum += u64::from(pixel.0[0]);
                count += 1;
            }
        }
    }
    if count == 0 {
        return 0.0;
    }
    sum as f32 / count as f32
}
