//! Color-blob strategy.
//!
//! Instead of trusting fixed centroids, this strategy finds lit LEDs by
//! color and places them relative to the detected power LED:
//!
//! 1. Convert the region to HSV and build one binary mask per LED color
//!    (green power, amber call, red valve).
//! 2. Label 8-connected components in each mask and keep those no larger
//!    than [`BlobConfig::max_blob_area`] as LED blobs.
//! 3. Take the top-most green blob as the power LED. Zone `k` is expected
//!    `k * spacing` rows below it.
//! 4. Match every call/valve blob to the nearest zone row. A blob more
//!    than half a spacing from every zone fails the whole frame.
//!
//! This tolerates a few pixels of camera drift at the cost of depending
//! on color rendition.

use std::collections::BTreeMap;

use image::{GrayImage, Luma};
use imageproc::region_labelling::{Connectivity, connected_components};

use crate::config::{BlobConfig, HsvRange};
use crate::decode::{DecodeFailure, DecodeOutcome};
use crate::frame::Frame;
use crate::types::{ZONE_COUNT, Zone, ZoneStatus};

/// Two zone distances closer than this are considered equal.
const TIE_EPSILON: f32 = 1e-3;

/// A pixel in HSV space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsv {
    /// Hue in degrees, `0.0..360.0`. Zero for achromatic pixels.
    pub hue: f32,
    /// Saturation, 0-255.
    pub saturation: u8,
    /// Value (max channel), 0-255.
    pub value: u8,
}

/// Convert one BGR pixel to HSV.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn bgr_to_hsv([b, g, r]: [u8; 3]) -> Hsv {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    if max == min {
        return Hsv {
            hue: 0.0,
            saturation: 0,
            value: max,
        };
    }

    let delta = f32::from(max - min);
    // delta <= max, so the ratio stays within 0..=255.
    let saturation = (255.0 * delta / f32::from(max)).round() as u8;

    let (rf, gf, bf) = (f32::from(r), f32::from(g), f32::from(b));
    let hue = if max == r {
        (60.0 * (gf - bf) / delta).rem_euclid(360.0)
    } else if max == g {
        60.0 * (bf - rf) / delta + 120.0
    } else {
        60.0 * (rf - gf) / delta + 240.0
    };

    Hsv {
        hue,
        saturation,
        value: max,
    }
}

impl HsvRange {
    /// Returns `true` if `hsv` lies inside all three bounds.
    #[must_use]
    pub fn contains(&self, hsv: Hsv) -> bool {
        self.hue.contains(hsv.hue)
            && (self.min_saturation..=self.max_saturation).contains(&hsv.saturation)
            && (self.min_value..=self.max_value).contains(&hsv.value)
    }
}

/// Binary mask (255 = in range) of the pixels matching `range`.
#[must_use = "returns the color mask"]
pub fn color_mask(roi: &Frame, range: &HsvRange) -> GrayImage {
    let dims = roi.dimensions();
    GrayImage::from_fn(dims.width, dims.height, |x, y| {
        let inside = roi
            .pixel(x, y)
            .is_some_and(|bgr| range.contains(bgr_to_hsv(bgr)));
        Luma([if inside { 255 } else { 0 }])
    })
}

/// One connected blob in a color mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blob {
    /// Centroid row (sub-pixel).
    pub row: f32,
    /// Centroid column (sub-pixel).
    pub col: f32,
    /// Pixel count.
    pub area: u32,
}

#[derive(Default)]
struct Accumulator {
    area: u32,
    row_sum: u64,
    col_sum: u64,
}

/// Find LED-sized blobs in a binary mask.
///
/// Blobs are returned in label order, i.e. by the raster position of
/// their first pixel.
#[must_use = "returns the detected blobs"]
#[allow(clippy::cast_precision_loss)]
pub fn find_leds(mask: &GrayImage, max_area: u32) -> Vec<Blob> {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));

    let mut blobs: BTreeMap<u32, Accumulator> = BTreeMap::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label.0[0];
        if label == 0 {
            continue;
        }
        let acc = blobs.entry(label).or_default();
        acc.area += 1;
        acc.row_sum += u64::from(y);
        acc.col_sum += u64::from(x);
    }

    blobs
        .into_values()
        .filter(|acc| acc.area <= max_area)
        .map(|acc| {
            let area = acc.area as f32;
            Blob {
                row: acc.row_sum as f32 / area,
                col: acc.col_sum as f32 / area,
                area: acc.area,
            }
        })
        .collect()
}

/// Zone index (zero-based) whose expected row is nearest `row`.
///
/// # Errors
///
/// [`DecodeFailure::ToleranceExceeded`] if the nearest zone is more than
/// half a spacing away, [`DecodeFailure::AmbiguousLed`] if two zones are
/// equally near.
fn match_zone(power_row: f32, row: f32, spacing: f32) -> Result<usize, DecodeFailure> {
    let limit = spacing / 2.0;

    let mut best: Option<(usize, f32)> = None;
    let mut tied = false;
    for k in 1..=4u8 {
        let expected = spacing.mul_add(f32::from(k), power_row);
        let distance = (row - expected).abs();
        match best {
            Some((_, best_distance)) if (distance - best_distance).abs() <= TIE_EPSILON => {
                tied = true;
            }
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => {
                best = Some((usize::from(k - 1), distance));
                tied = false;
            }
        }
    }

    let Some((zone, distance)) = best else {
        return Err(DecodeFailure::NoLedsFound);
    };
    if distance > limit {
        return Err(DecodeFailure::ToleranceExceeded {
            offset: distance,
            limit,
        });
    }
    if tied {
        return Err(DecodeFailure::AmbiguousLed { row });
    }
    Ok(zone)
}

/// Decode a cropped region with the color-blob strategy.
#[must_use = "returns the decode outcome"]
pub fn read(roi: &Frame, config: &BlobConfig) -> DecodeOutcome {
    let power = find_leds(&color_mask(roi, &config.power), config.max_blob_area);
    let calls = find_leds(&color_mask(roi, &config.call), config.max_blob_area);
    let valves = find_leds(&color_mask(roi, &config.valve), config.max_blob_area);

    if power.is_empty() && calls.is_empty() && valves.is_empty() {
        return DecodeOutcome::Failed(DecodeFailure::NoLedsFound);
    }
    let Some(power_led) = power.iter().min_by(|a, b| a.row.total_cmp(&b.row)) else {
        return DecodeOutcome::Failed(DecodeFailure::PowerLedUnlit);
    };

    let mut zones = [Zone::default(); ZONE_COUNT];
    for blob in &calls {
        match match_zone(power_led.row, blob.row, config.spacing) {
            Ok(zone) => zones[zone].call = true,
            Err(reason) => return DecodeOutcome::Failed(reason),
        }
    }
    for blob in &valves {
        match match_zone(power_led.row, blob.row, config.spacing) {
            Ok(zone) => zones[zone].valve = true,
            Err(reason) => return DecodeOutcome::Failed(reason),
        }
    }
    DecodeOutcome::Decoded(ZoneStatus::new(zones))
}
