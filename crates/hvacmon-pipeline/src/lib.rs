//! hvacmon-pipeline: LED-state extraction and change detection (sans-IO).
//!
//! Reads the four-zone HVAC controller panel from a fixed camera:
//!
//! - [`PanelDecoder`] crops the calibrated region of a BGR [`Frame`] and
//!   classifies the power LED and eight zone-signal LEDs, producing a
//!   [`DecodeOutcome`] (a complete [`ZoneStatus`] or a failure reason).
//! - [`StatusTracker`] turns a stream of timestamped outcomes into
//!   [`ZoneReading`]s: closed intervals of constant status, emitted on
//!   change, on decode failure, and as a heartbeat after the quiescence
//!   timeout.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! frames and returns structured data. Camera acquisition, storage, and
//! scheduling live in `hvacmon` and `hvacmon-store`.

pub mod blob;
pub mod centroid;
pub mod config;
pub mod decode;
pub mod frame;
pub mod sink;
pub mod tracker;
pub mod types;

pub use centroid::LedMeasurements;
pub use config::{BlobConfig, CentroidConfig, HsvRange, HueRange, LedCentroid, PanelConfig, Roi};
pub use decode::{DecodeFailure, DecodeOutcome, DecoderKind, PanelDecoder, PanelReader};
pub use frame::Frame;
pub use sink::{MemorySink, ReadingSink};
pub use tracker::{StatusTracker, TrackerState, Transition};
pub use types::{
    Dimensions, LED_COUNT, LED_NAMES, PanelError, SIGNAL_COUNT, TemperatureReading, Timestamp,
    ZONE_COUNT, Zone, ZoneReading, ZoneStatus,
};

/// Decode one frame and feed it to the tracker.
///
/// Convenience for hosts that do not need the outcome itself.
///
/// # Errors
///
/// Returns [`PanelError::NonMonotonicTimestamp`] if `timestamp` is not
/// after the tracker's last sample.
pub fn process(
    decoder: &PanelDecoder,
    tracker: &mut StatusTracker,
    timestamp: Timestamp,
    frame: &Frame,
) -> Result<Option<ZoneReading>, PanelError> {
    tracker.observe(timestamp, decoder.decode(frame))
}
