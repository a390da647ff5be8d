//! Shared types for the hvacmon LED extraction pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{LedCentroid, Roi};

/// Re-export `GrayImage` so downstream crates can reference the
/// luminance raster without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` so downstream crates can hand decoded camera
/// images to [`Frame::from_rgb`](crate::Frame::from_rgb).
pub use image::RgbImage;

/// Wall-clock instant attached to every captured frame.
///
/// Carries an explicit UTC offset so persisted readings remain
/// unambiguous across daylight-saving changes.
pub type Timestamp = chrono::DateTime<chrono::FixedOffset>;

/// Number of HVAC zones on the panel.
pub const ZONE_COUNT: usize = 4;

/// Number of zone-signal LEDs (call + valve per zone).
pub const SIGNAL_COUNT: usize = ZONE_COUNT * 2;

/// Number of LEDs sampled by the decoder: power plus the zone signals.
pub const LED_COUNT: usize = SIGNAL_COUNT + 1;

/// Human-readable LED names in centroid-table order.
pub const LED_NAMES: [&str; LED_COUNT] = [
    "power", "z1_call", "z1_valve", "z2_call", "z2_valve", "z3_call", "z3_valve", "z4_call",
    "z4_valve",
];

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create new dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Indicator state of a single zone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Zone {
    /// Thermostat is calling for heat.
    pub call: bool,
    /// Zone valve is open.
    pub valve: bool,
}

impl Zone {
    /// Create a zone state.
    #[must_use]
    pub const fn new(call: bool, valve: bool) -> Self {
        Self { call, valve }
    }
}

/// Complete panel state: four zones, each with a call and a valve signal.
///
/// Always fully defined. A frame that cannot be read produces a
/// [`DecodeFailure`](crate::DecodeFailure), never a partial status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZoneStatus {
    zones: [Zone; ZONE_COUNT],
}

impl ZoneStatus {
    /// Every signal off. Also used as the "unknown" baseline after a
    /// decode failure.
    pub const ALL_OFF: Self = Self {
        zones: [Zone::new(false, false); ZONE_COUNT],
    };

    /// Create a status from per-zone states.
    #[must_use]
    pub const fn new(zones: [Zone; ZONE_COUNT]) -> Self {
        Self { zones }
    }

    /// Create a status from the eight signals in panel order
    /// (`z1_call, z1_valve, z2_call, ..., z4_valve`).
    #[must_use]
    pub const fn from_signals(signals: [bool; SIGNAL_COUNT]) -> Self {
        Self {
            zones: [
                Zone::new(signals[0], signals[1]),
                Zone::new(signals[2], signals[3]),
                Zone::new(signals[4], signals[5]),
                Zone::new(signals[6], signals[7]),
            ],
        }
    }

    /// The eight signals in panel order.
    #[must_use]
    pub const fn signals(&self) -> [bool; SIGNAL_COUNT] {
        let z = &self.zones;
        [
            z[0].call, z[0].valve, z[1].call, z[1].valve, z[2].call, z[2].valve, z[3].call,
            z[3].valve,
        ]
    }

    /// Per-zone states, zone 1 first.
    #[must_use]
    pub const fn zones(&self) -> &[Zone; ZONE_COUNT] {
        &self.zones
    }

    /// State of zone `index` (zero-based), if it exists.
    #[must_use]
    pub fn zone(&self, index: usize) -> Option<Zone> {
        self.zones.get(index).copied()
    }

    /// Returns `true` if no call or valve LED is lit.
    #[must_use]
    pub fn is_all_off(&self) -> bool {
        *self == Self::ALL_OFF
    }
}

impl fmt::Display for ZoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, zone) in self.zones.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(
                f,
                "z{}:{}{}",
                i + 1,
                u8::from(zone.call),
                u8::from(zone.valve)
            )?;
        }
        Ok(())
    }
}

/// The panel held `status` from `start` until `end`.
///
/// Produced only by [`StatusTracker`](crate::StatusTracker); never
/// revised once emitted. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneReading {
    /// When the status was first observed.
    pub start: Timestamp,
    /// When the interval was closed.
    pub end: Timestamp,
    /// The status held throughout the interval.
    pub status: ZoneStatus,
}

/// An outdoor temperature sample, recorded independently of the panel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReading {
    /// When the temperature was obtained.
    pub timestamp: Timestamp,
    /// Temperature in degrees Fahrenheit.
    pub fahrenheit: f64,
}

/// Errors raised by the pipeline.
///
/// Geometry and configuration problems are fatal and surface once, at
/// decoder construction. Per-frame problems are reported as
/// [`DecodeFailure`](crate::DecodeFailure) instead.
#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    /// Failed to decode encoded image bytes into a frame.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Panel configuration is invalid.
    #[error("invalid panel configuration: {0}")]
    InvalidConfig(String),

    /// The region of interest does not fit inside the camera frame.
    #[error("region of interest {roi} does not fit within a {resolution} frame")]
    RoiOutOfBounds {
        /// Configured region.
        roi: Roi,
        /// Configured camera resolution.
        resolution: Dimensions,
    },

    /// A sampling window extends past the region of interest.
    #[error("{led} sampling window at {centroid} (half-width {window}) leaves region {roi}")]
    CentroidOutOfRoi {
        /// LED name from [`LED_NAMES`].
        led: &'static str,
        /// Offending centroid.
        centroid: LedCentroid,
        /// Window half-width.
        window: u32,
        /// Region the centroid is relative to.
        roi: Roi,
    },

    /// A sample was observed at or before the previous one.
    #[error("sample at {timestamp} is not after the previous sample at {last}")]
    NonMonotonicTimestamp {
        /// Timestamp currently held by the tracker.
        last: Timestamp,
        /// Rejected timestamp.
        timestamp: Timestamp,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn signals_round_trip_in_panel_order() {
        let signals = [true, false, false, true, true, true, false, false];
        let status = ZoneStatus::from_signals(signals);
        assert_eq!(status.signals(), signals);
        assert_eq!(status.zone(1), Some(Zone::new(false, true)));
        assert_eq!(status.zone(4), None);
    }

    #[test]
    fn all_off_is_default() {
        assert_eq!(ZoneStatus::default(), ZoneStatus::ALL_OFF);
        assert!(ZoneStatus::ALL_OFF.is_all_off());
        let z4_valve =
            ZoneStatus::from_signals([false, false, false, false, false, false, false, true]);
        assert!(!z4_valve.is_all_off());
    }

    #[test]
    fn status_equality_is_element_wise() {
        let a = ZoneStatus::from_signals([true, false, false, false, false, false, false, false]);
        let b = ZoneStatus::from_signals([false, true, false, false, false, false, false, false]);
        assert_ne!(a, b);
        assert_eq!(
            a,
            ZoneStatus::new([
                Zone::new(true, false),
                Zone::default(),
                Zone::default(),
                Zone::default(),
            ])
        );
    }

    #[test]
    fn status_display_lists_zones() {
        let status =
            ZoneStatus::from_signals([true, false, false, false, true, true, false, false]);
        assert_eq!(status.to_string(), "z1:10 z2:00 z3:11 z4:00");
    }

    #[test]
    fn dimensions_display() {
        assert_eq!(Dimensions::new(1280, 720).to_string(), "1280x720");
    }

    #[test]
    fn zone_reading_serializes_timestamps_with_offset() {
        let start =
            chrono::DateTime::parse_from_rfc3339("2018-03-04T12:00:00.250000-05:00").unwrap();
        let end = chrono::DateTime::parse_from_rfc3339("2018-03-04T12:01:00-05:00").unwrap();
        let reading = ZoneReading {
            start,
            end,
            status: ZoneStatus::ALL_OFF,
        };
        let json = serde_json::to_string(&reading).unwrap();
        assert!(json.contains("-05:00"), "offset lost: {json}");
        let back: ZoneReading = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reading);
    }

    #[test]
    fn error_display_messages() {
        let err = PanelError::InvalidConfig("threshold must be finite".to_string());
        assert_eq!(
            err.to_string(),
            "invalid panel configuration: threshold must be finite"
        );
        assert_eq!(PanelError::EmptyInput.to_string(), "input image data is empty");
    }
}
