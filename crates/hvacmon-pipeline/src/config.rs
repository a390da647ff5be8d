//! Deployment configuration: camera geometry, LED layout, and thresholds.
//!
//! Every value here describes one physical, pre-calibrated camera mount.
//! Nothing is discovered at runtime. [`PanelConfig::validate`] checks the
//! geometry once, at startup, so per-frame decoding never has to.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::decode::DecoderKind;
use crate::types::{Dimensions, LED_COUNT, LED_NAMES, PanelError};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// A rectangular region of interest in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    /// Left edge (column).
    pub x: u32,
    /// Top edge (row).
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Roi {
    /// Create a region from its top-left corner and size.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns `true` if the region is non-empty and lies entirely inside
    /// a frame of the given dimensions.
    #[must_use]
    pub fn fits_within(&self, dimensions: Dimensions) -> bool {
        let right = self.x.checked_add(self.width);
        let bottom = self.y.checked_add(self.height);
        self.width > 0
            && self.height > 0
            && right.is_some_and(|r| r <= dimensions.width)
            && bottom.is_some_and(|b| b <= dimensions.height)
    }

    /// Size of the cropped region.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Centre of one LED, relative to the region of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedCentroid {
    /// Row offset from the top of the region.
    pub row: u32,
    /// Column offset from the left of the region.
    pub col: u32,
}

impl LedCentroid {
    /// Create a centroid at `(row, col)`.
    #[must_use]
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for LedCentroid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Settings for the fixed-centroid brightness strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CentroidConfig {
    /// Region cropped from the frame before sampling.
    pub roi: Roi,

    /// LED centres in the order
    /// `[power, z1_call, z1_valve, z2_call, z2_valve, z3_call, z3_valve, z4_call, z4_valve]`.
    pub centroids: [LedCentroid; LED_COUNT],

    /// Minimum mean luminance (0-255) for an LED to count as lit.
    pub threshold: f32,

    /// Sampling window half-width: each LED is averaged over a
    /// `(2 * window + 1)` square patch.
    pub window: u32,
}

impl CentroidConfig {
    /// Default brightness threshold.
    pub const DEFAULT_THRESHOLD: f32 = 10.0;

    /// Default sampling window half-width (3x3 patch).
    pub const DEFAULT_WINDOW: u32 = 1;

    /// Default region: the panel's LED column in a 1280x720 frame.
    pub const DEFAULT_ROI: Roi = Roi::new(620, 120, 40, 60);

    /// Default LED centres within [`DEFAULT_ROI`](Self::DEFAULT_ROI).
    /// Call LEDs share column 12, valve LEDs column 19, zones are
    /// 7 rows apart below the power LED.
    pub const DEFAULT_CENTROIDS: [LedCentroid; LED_COUNT] = [
        LedCentroid::new(7, 12),
        LedCentroid::new(14, 12),
        LedCentroid::new(14, 19),
        LedCentroid::new(21, 12),
        LedCentroid::new(21, 19),
        LedCentroid::new(28, 12),
        LedCentroid::new(28, 19),
        LedCentroid::new(35, 12),
        LedCentroid::new(35, 19),
    ];

    /// Check that the threshold is usable and every sampling window
    /// lies inside the region.
    ///
    /// # Errors
    ///
    /// Returns [`PanelError::InvalidConfig`] for a non-finite or negative
    /// threshold and [`PanelError::CentroidOutOfRoi`] for a window that
    /// leaves the region.
    pub fn validate(&self) -> Result<(), PanelError> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(PanelError::InvalidConfig(format!(
                "brightness threshold must be finite and non-negative, got {}",
                self.threshold
            )));
        }
        for (centroid, led) in self.centroids.iter().zip(LED_NAMES) {
            let inside = |center: u32, extent: u32| {
                center >= self.window
                    && center
                        .checked_add(self.window)
                        .is_some_and(|far| far < extent)
            };
            if !inside(centroid.row, self.roi.height) || !inside(centroid.col, self.roi.width) {
                return Err(PanelError::CentroidOutOfRoi {
                    led,
                    centroid: *centroid,
                    window: self.window,
                    roi: self.roi,
                });
            }
        }
        Ok(())
    }
}

impl Default for CentroidConfig {
    fn default() -> Self {
        Self {
            roi: Self::DEFAULT_ROI,
            centroids: Self::DEFAULT_CENTROIDS,
            threshold: Self::DEFAULT_THRESHOLD,
            window: Self::DEFAULT_WINDOW,
        }
    }
}

/// An inclusive hue interval in degrees.
///
/// When `start > end` the interval wraps through 0/360, so reds can be
/// selected with e.g. `340..=20`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HueRange {
    /// First hue in the interval (degrees).
    pub start: f32,
    /// Last hue in the interval (degrees).
    pub end: f32,
}

impl HueRange {
    /// Create a hue interval.
    #[must_use]
    pub const fn new(start: f32, end: f32) -> Self {
        Self { start, end }
    }

    /// Returns `true` if `hue` (degrees) lies in the interval.
    #[must_use]
    pub fn contains(&self, hue: f32) -> bool {
        if self.start <= self.end {
            (self.start..=self.end).contains(&hue)
        } else {
            hue >= self.start || hue <= self.end
        }
    }
}

/// Bounds selecting one LED color in HSV space.
///
/// Hue is in degrees, saturation and value on the 0-255 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HsvRange {
    /// Accepted hues.
    pub hue: HueRange,
    /// Minimum saturation.
    pub min_saturation: u8,
    /// Maximum saturation.
    pub max_saturation: u8,
    /// Minimum value (brightness).
    pub min_value: u8,
    /// Maximum value (brightness).
    pub max_value: u8,
}

impl HsvRange {
    /// Create a range with saturation and value open at the top (255).
    #[must_use]
    pub const fn new(hue: HueRange, min_saturation: u8, min_value: u8) -> Self {
        Self {
            hue,
            min_saturation,
            max_saturation: u8::MAX,
            min_value,
            max_value: u8::MAX,
        }
    }
}

/// Settings for the color-blob strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    /// Region cropped from the frame before color masking.
    pub roi: Roi,
    /// Color of the (green) power LED.
    pub power: HsvRange,
    /// Color of the thermostat call LEDs.
    pub call: HsvRange,
    /// Color of the zone valve LEDs.
    pub valve: HsvRange,
    /// Vertical distance in pixels between the power LED and zone 1,
    /// and between consecutive zones.
    pub spacing: f32,
    /// Blobs larger than this many pixels are ignored (reflections,
    /// glare) rather than treated as LEDs.
    pub max_blob_area: u32,
}

impl BlobConfig {
    /// Default region: the LED column in a 640x480 frame.
    pub const DEFAULT_ROI: Roi = Roi::new(310, 60, 30, 70);
    /// Default zone spacing in pixels.
    pub const DEFAULT_SPACING: f32 = 5.5;
    /// Default blob area limit in pixels.
    pub const DEFAULT_MAX_BLOB_AREA: u32 = 25;
    /// Green power LED.
    pub const DEFAULT_POWER: HsvRange = HsvRange::new(HueRange::new(80.0, 180.0), 15, 150);
    /// Amber call LEDs.
    pub const DEFAULT_CALL: HsvRange = HsvRange::new(HueRange::new(10.0, 70.0), 20, 150);
    /// Red valve LEDs (wraps through 0 degrees).
    pub const DEFAULT_VALVE: HsvRange = HsvRange::new(HueRange::new(280.0, 10.0), 100, 150);

    /// Check the spacing, blob area, and color ranges.
    ///
    /// # Errors
    ///
    /// Returns [`PanelError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> Result<(), PanelError> {
        if !self.spacing.is_finite() || self.spacing <= 0.0 {
            return Err(PanelError::InvalidConfig(format!(
                "LED spacing must be finite and positive, got {}",
                self.spacing
            )));
        }
        if self.max_blob_area == 0 {
            return Err(PanelError::InvalidConfig(
                "max_blob_area must be at least 1 pixel".to_string(),
            ));
        }
        let ranges = [
            ("power", &self.power),
            ("call", &self.call),
            ("valve", &self.valve),
        ];
        for (name, range) in ranges {
            let hue_ok = |h: f32| h.is_finite() && (0.0..=360.0).contains(&h);
            if !hue_ok(range.hue.start) || !hue_ok(range.hue.end) {
                return Err(PanelError::InvalidConfig(format!(
                    "{name} hue bounds must lie in 0..=360 degrees"
                )));
            }
            if range.min_saturation > range.max_saturation || range.min_value > range.max_value {
                return Err(PanelError::InvalidConfig(format!(
                    "{name} saturation/value bounds are inverted"
                )));
            }
        }
        Ok(())
    }
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            roi: Self::DEFAULT_ROI,
            power: Self::DEFAULT_POWER,
            call: Self::DEFAULT_CALL,
            valve: Self::DEFAULT_VALVE,
            spacing: Self::DEFAULT_SPACING,
            max_blob_area: Self::DEFAULT_MAX_BLOB_AREA,
        }
    }
}

/// Complete configuration consumed by the decoder and tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Frame size the camera is configured to deliver.
    pub resolution: Dimensions,

    /// Which decoding strategy to run.
    pub strategy: DecoderKind,

    /// Fixed-centroid strategy settings.
    pub centroids: CentroidConfig,

    /// Color-blob strategy settings.
    pub blob: BlobConfig,

    /// Longest a constant status may go unrecorded before a heartbeat
    /// reading is written (seconds).
    #[serde(with = "duration_serde")]
    pub quiescence_timeout: Duration,
}

impl PanelConfig {
    /// Default camera resolution.
    pub const DEFAULT_RESOLUTION: Dimensions = Dimensions::new(1280, 720);

    /// Default quiescence timeout.
    pub const DEFAULT_QUIESCENCE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Region cropped by the selected strategy.
    #[must_use]
    pub const fn roi(&self) -> Roi {
        match self.strategy {
            DecoderKind::FixedCentroids => self.centroids.roi,
            DecoderKind::ColorBlob => self.blob.roi,
        }
    }

    /// Validate the selected strategy's geometry against the resolution.
    ///
    /// Only the active strategy is checked; the other section may hold
    /// calibration for a different camera mode.
    ///
    /// # Errors
    ///
    /// Returns [`PanelError::RoiOutOfBounds`] if the region does not fit
    /// the frame, or the strategy's own validation error.
    pub fn validate(&self) -> Result<(), PanelError> {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            return Err(PanelError::InvalidConfig(format!(
                "resolution must be non-empty, got {}",
                self.resolution
            )));
        }
        let roi = self.roi();
        if !roi.fits_within(self.resolution) {
            return Err(PanelError::RoiOutOfBounds {
                roi,
                resolution: self.resolution,
            });
        }
        match self.strategy {
            DecoderKind::FixedCentroids => self.centroids.validate(),
            DecoderKind::ColorBlob => self.blob.validate(),
        }
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            resolution: Self::DEFAULT_RESOLUTION,
            strategy: DecoderKind::default(),
            centroids: CentroidConfig::default(),
            blob: BlobConfig::default(),
            quiescence_timeout: Self::DEFAULT_QUIESCENCE_TIMEOUT,
        }
    }
}
