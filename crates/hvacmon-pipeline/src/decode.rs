//! Panel decoding: frame in, [`DecodeOutcome`] out.
//!
//! This module defines the [`PanelReader`] trait for pluggable LED
//! reading strategies, the [`DecoderKind`] enum for selecting one from
//! configuration, and [`PanelDecoder`], which validates the geometry once
//! and then decodes frames.
//!
//! # Strategy pattern
//!
//! Both strategies answer the same question from the same cropped region.
//! Exactly one runs per decoder; their partial results are never combined.

use serde::{Deserialize, Serialize};

use crate::blob;
use crate::centroid::{self, LedMeasurements};
use crate::config::PanelConfig;
use crate::frame::Frame;
use crate::types::{Dimensions, PanelError, ZoneStatus};

/// Why a frame could not be decoded.
///
/// Decode failures are expected in normal operation (panel powered off,
/// a lighting glitch) and never abort the sampling loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum DecodeFailure {
    /// The power LED is dark: the panel is off or the image is unreadable.
    #[error("power LED not lit")]
    PowerLedUnlit,

    /// No LED of any color was found in the region.
    #[error("no LEDs found")]
    NoLedsFound,

    /// A detected LED lies too far from every expected zone position.
    #[error("LED {offset:.2} px from nearest expected position exceeds tolerance of {limit:.2} px")]
    ToleranceExceeded {
        /// Distance to the nearest expected position.
        offset: f32,
        /// Largest accepted distance (half the spacing).
        limit: f32,
    },

    /// A detected LED is equally close to two zone positions.
    #[error("ambiguous LED position at row {row:.2}")]
    AmbiguousLed {
        /// Blob centroid row within the region.
        row: f32,
    },

    /// The camera delivered a frame of the wrong size.
    #[error("frame is {actual}, expected {expected}")]
    FrameSizeMismatch {
        /// Configured resolution.
        expected: Dimensions,
        /// Size of the frame received.
        actual: Dimensions,
    },
}

/// Result of decoding one frame: a complete status or a reason.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DecodeOutcome {
    /// All eight signals were read.
    Decoded(ZoneStatus),
    /// The frame could not be read.
    Failed(DecodeFailure),
}

impl DecodeOutcome {
    /// The decoded status, if any.
    #[must_use]
    pub const fn status(&self) -> Option<ZoneStatus> {
        match self {
            Self::Decoded(status) => Some(*status),
            Self::Failed(_) => None,
        }
    }

    /// The failure reason, if any.
    #[must_use]
    pub const fn failure(&self) -> Option<DecodeFailure> {
        match self {
            Self::Decoded(_) => None,
            Self::Failed(reason) => Some(*reason),
        }
    }
}

/// Selects which LED reading strategy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoderKind {
    /// Threshold the mean luminance at calibrated centroids.
    ///
    /// Deterministic and nearly free per frame, but assumes the camera
    /// never moves.
    #[default]
    FixedCentroids,

    /// Detect LEDs by color and place them relative to the power LED.
    ///
    /// Tolerates small camera drift.
    ColorBlob,
}

/// Trait for LED reading strategies.
///
/// Input: the region of interest already cropped from a frame of the
/// configured resolution.
pub trait PanelReader {
    /// Read the panel state from the cropped region.
    fn read(&self, roi: &Frame, config: &PanelConfig) -> DecodeOutcome;
}

impl PanelReader for DecoderKind {
    fn read(&self, roi: &Frame, config: &PanelConfig) -> DecodeOutcome {
        match *self {
            Self::FixedCentroids => centroid::read(&roi.luminance(), &config.centroids),
            Self::ColorBlob => blob::read(roi, &config.blob),
        }
    }
}

/// Decodes frames from one pre-calibrated camera mount.
///
/// Construction validates the configuration; afterwards
/// [`decode`](Self::decode) is a pure function of the frame.
#[derive(Debug, Clone)]
pub struct PanelDecoder {
    config: PanelConfig,
}

impl PanelDecoder {
    /// Validate `config` and build a decoder.
    ///
    /// # Errors
    ///
    /// Returns the first geometry or threshold problem found by
    /// [`PanelConfig::validate`]. These are fatal: the deployment is
    /// miscalibrated and no frame can be decoded.
    pub fn new(config: PanelConfig) -> Result<Self, PanelError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The validated configuration.
    #[must_use]
    pub const fn config(&self) -> &PanelConfig {
        &self.config
    }

    /// Decode one frame.
    ///
    /// Crops the region of interest and runs the configured strategy.
    /// All-or-nothing: either every signal is read or a reason is given.
    #[must_use = "returns the decode outcome"]
    pub fn decode(&self, frame: &Frame) -> DecodeOutcome {
        match self.crop(frame) {
            Ok(roi) => self.config.strategy.read(&roi, &self.config),
            Err(reason) => DecodeOutcome::Failed(reason),
        }
    }

    /// Per-LED patch means under the fixed-centroid geometry.
    ///
    /// Independent of the selected strategy; intended for picking a
    /// threshold from real frames. Returns `None` for a frame of the
    /// wrong size or when the centroid ROI does not fit the frame.
    #[must_use]
    pub fn measure(&self, frame: &Frame) -> Option<LedMeasurements> {
        if frame.dimensions() != self.config.resolution {
            return None;
        }
        let roi = frame.crop(&self.config.centroids.roi)?;
        Some(centroid::measure(&roi.luminance(), &self.config.centroids))
    }

    fn crop(&self, frame: &Frame) -> Result<Frame, DecodeFailure> {
        let mismatch = DecodeFailure::FrameSizeMismatch {
            expected: self.config.resolution,
            actual: frame.dimensions(),
        };
        if frame.dimensions() != self.config.resolution {
            return Err(mismatch);
        }
        frame.crop(&self.config.roi()).ok_or(mismatch)
    }
}
