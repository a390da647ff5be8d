//! The sampling loop body: decode, track, persist, archive.

use std::convert::Infallible;
use std::path::PathBuf;

use hvacmon_pipeline::{
    Frame, PanelDecoder, PanelError, ReadingSink, StatusTracker, Timestamp, Transition,
};
use hvacmon_store::StoreError;

use crate::snapshot::SnapshotArchive;

/// Errors raised by the monitor binary.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Configuration, decoding setup, or timestamp ordering failed.
    #[error(transparent)]
    Panel(#[from] PanelError),

    /// The reading store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A file or directory could not be accessed.
    #[error("{}: {source}", path.display())]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A frame file could not be decoded as an image.
    #[error("{}: {source}", path.display())]
    Frame {
        /// Frame file.
        path: PathBuf,
        /// Underlying error.
        source: PanelError,
    },

    /// A snapshot could not be written.
    #[error("failed to write snapshot {}: {source}", path.display())]
    Snapshot {
        /// Destination file.
        path: PathBuf,
        /// Underlying error.
        source: image::ImageError,
    },

    /// A configuration file is not valid JSON for a panel configuration.
    #[error("invalid configuration file {}: {source}", path.display())]
    Config {
        /// Configuration file.
        path: PathBuf,
        /// Parse failure.
        source: serde_json::Error,
    },

    /// Output could not be serialized.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<Infallible> for MonitorError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

/// Drives one panel: every sample goes through the decoder and tracker,
/// and each emitted reading is appended to the sink.
///
/// The first sample only seeds the tracker; it never produces a reading.
pub struct Monitor<S> {
    decoder: PanelDecoder,
    tracker: Option<StatusTracker>,
    sink: S,
    snapshots: Option<SnapshotArchive>,
}

impl<S> Monitor<S>
where
    S: ReadingSink,
    MonitorError: From<S::Error>,
{
    /// Monitor writing readings to `sink`.
    pub const fn new(decoder: PanelDecoder, sink: S) -> Self {
        Self {
            decoder,
            tracker: None,
            sink,
            snapshots: None,
        }
    }

    /// Also archive the frame behind every reading.
    #[must_use]
    pub fn with_snapshots(mut self, archive: SnapshotArchive) -> Self {
        self.snapshots = Some(archive);
        self
    }

    /// The tracker, once the first sample has been seen.
    pub const fn tracker(&self) -> Option<&StatusTracker> {
        self.tracker.as_ref()
    }

    /// The sink.
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Process one captured frame.
    ///
    /// The tracker only advances once the reading, if any, is stored, so a
    /// sample whose write failed can be retried. A snapshot that cannot be
    /// written is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Panel`] for an out-of-order timestamp
    /// (nothing is recorded) and the sink's error if the reading cannot be
    /// stored (the tracker is left as it was).
    pub fn sample(
        &mut self,
        timestamp: Timestamp,
        frame: &Frame,
    ) -> Result<Transition, MonitorError> {
        let outcome = self.decoder.decode(frame);
        tracing::debug!(%timestamp, ?outcome, "sample decoded");

        let Some(tracker) = self.tracker.as_mut() else {
            let timeout = self.decoder.config().quiescence_timeout;
            let tracker = StatusTracker::from_initial(timestamp, outcome, timeout);
            tracing::info!(
                %timestamp,
                status = %tracker.last_status(),
                "tracking started"
            );
            self.tracker = Some(tracker);
            return Ok(Transition::Unchanged);
        };

        let (next, transition) = tracker.peek(timestamp, outcome)?;
        match &transition {
            Transition::Unchanged => {}
            Transition::Changed(reading) => tracing::info!(
                previous = %reading.status,
                current = %next.last_status,
                start = %reading.start,
                end = %reading.end,
                "status change detected"
            ),
            Transition::TimedOut(reading) => tracing::info!(
                status = %reading.status,
                start = %reading.start,
                end = %reading.end,
                "no change within quiescence timeout, recording heartbeat"
            ),
            Transition::Failed { reading, reason } => tracing::warn!(
                %reason,
                previous = %reading.status,
                start = %reading.start,
                end = %reading.end,
                "failed to decode panel"
            ),
        }

        if let Some(reading) = transition.reading() {
            self.sink.append_zone_reading(&reading)?;
        }
        tracker.commit(next);

        if let Some(archive) = &self.snapshots {
            match archive.save(&transition, frame) {
                Ok(Some(path)) => tracing::debug!(path = %path.display(), "snapshot saved"),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "snapshot skipped"),
            }
        }

        Ok(transition)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{DateTime, TimeDelta};
    use hvacmon_pipeline::{
        CentroidConfig, DecodeFailure, MemorySink, PanelConfig, TemperatureReading, Zone,
        ZoneReading, ZoneStatus,
    };
    use hvacmon_store::SqliteStore;

    use super::*;

    fn at(seconds: i64) -> Timestamp {
        DateTime::parse_from_rfc3339("2018-03-04T06:30:00-05:00").unwrap()
            + TimeDelta::seconds(seconds)
    }

    /// Full-resolution frame with the listed LEDs (by index into
    /// [`CentroidConfig::DEFAULT_CENTROIDS`]) lit.
    fn frame(lit: &[usize]) -> Frame {
        let config = CentroidConfig::default();
        Frame::from_fn(1280, 720, |x, y| {
            let on = lit.iter().any(|&i| {
                let c = config.centroids[i];
                x.abs_diff(config.roi.x + c.col) <= 1 && y.abs_diff(config.roi.y + c.row) <= 1
            });
            if on { [200, 200, 200] } else { [2, 2, 2] }
        })
    }

    fn z1_call() -> ZoneStatus {
        ZoneStatus::new([
            Zone::new(true, false),
            Zone::default(),
            Zone::default(),
            Zone::default(),
        ])
    }

    fn monitor() -> Monitor<MemorySink> {
        Monitor::new(
            PanelDecoder::new(PanelConfig::default()).unwrap(),
            MemorySink::default(),
        )
    }

    #[test]
    fn first_sample_seeds_without_reading() {
        let mut m = monitor();
        assert!(m.tracker().is_none());
        assert_eq!(m.sample(at(0), &frame(&[0, 1])).unwrap(), Transition::Unchanged);
        assert_eq!(m.tracker().unwrap().last_status(), z1_call());
        assert!(m.sink().zone_readings.is_empty());
    }

    #[test]
    fn change_failure_and_heartbeat_reach_the_sink() {
        let mut m = monitor();
        m.sample(at(0), &frame(&[0])).unwrap();
        m.sample(at(5), &frame(&[0])).unwrap();
        m.sample(at(10), &frame(&[0, 1])).unwrap();
        m.sample(at(71), &frame(&[0, 1])).unwrap();
        let failed = m.sample(at(80), &frame(&[])).unwrap();
        assert_eq!(failed.reading().map(|r| r.status), Some(z1_call()));
        assert!(matches!(
            failed,
            Transition::Failed {
                reason: DecodeFailure::PowerLedUnlit,
                ..
            }
        ));

        assert_eq!(
            m.sink().zone_readings,
            vec![
                ZoneReading {
                    start: at(0),
                    end: at(10),
                    status: ZoneStatus::ALL_OFF,
                },
                ZoneReading {
                    start: at(10),
                    end: at(71),
                    status: z1_call(),
                },
                ZoneReading {
                    start: at(71),
                    end: at(80),
                    status: z1_call(),
                },
            ]
        );
    }

    #[test]
    fn out_of_order_sample_is_rejected() {
        let mut m = monitor();
        m.sample(at(10), &frame(&[0])).unwrap();
        assert!(matches!(
            m.sample(at(10), &frame(&[0, 1])),
            Err(MonitorError::Panel(PanelError::NonMonotonicTimestamp { .. }))
        ));
        assert!(m.sink().zone_readings.is_empty());
        assert_eq!(m.tracker().unwrap().last_status(), ZoneStatus::ALL_OFF);
    }

    #[test]
    fn readings_are_archived_by_category() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = monitor().with_snapshots(SnapshotArchive::new(dir.path()));
        m.sample(at(0), &frame(&[0])).unwrap();
        m.sample(at(1), &frame(&[0, 2])).unwrap();
        m.sample(at(2), &frame(&[])).unwrap();

        let names = |sub: &str| -> Vec<String> {
            std::fs::read_dir(dir.path().join(sub))
                .map(|entries| {
                    entries
                        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                        .collect()
                })
                .unwrap_or_default()
        };
        assert_eq!(
            names("statechange"),
            ["2018-03-04_06-30-00_2018-03-04_06-30-01.png"]
        );
        assert_eq!(
            names("failures"),
            ["2018-03-04_06-30-01_2018-03-04_06-30-02.png"]
        );
        assert!(names("timeouts").is_empty());
    }

    #[test]
    fn works_with_sqlite_store() {
        let mut m = Monitor::new(
            PanelDecoder::new(PanelConfig::default()).unwrap(),
            SqliteStore::open_in_memory().unwrap(),
        );
        m.sample(at(0), &frame(&[0])).unwrap();
        m.sample(at(3), &frame(&[0, 1])).unwrap();
        let stored = m.sink().zone_readings().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, ZoneStatus::ALL_OFF);
        assert_eq!(stored[0].end, at(3));
    }

    /// Fails the first `failures` appends, then stores like [`MemorySink`].
    #[derive(Default)]
    struct FlakySink {
        failures: usize,
        stored: MemorySink,
    }

    impl ReadingSink for FlakySink {
        type Error = MonitorError;

        fn append_zone_reading(&mut self, reading: &ZoneReading) -> Result<(), MonitorError> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(MonitorError::Io {
                    path: PathBuf::from("readings.db"),
                    source: std::io::Error::other("disk full"),
                });
            }
            let Ok(()) = self.stored.append_zone_reading(reading);
            Ok(())
        }

        fn append_temperature_reading(
            &mut self,
            reading: &TemperatureReading,
        ) -> Result<(), MonitorError> {
            let Ok(()) = self.stored.append_temperature_reading(reading);
            Ok(())
        }
    }

    #[test]
    fn failed_write_can_be_retried() {
        let mut m = Monitor::new(
            PanelDecoder::new(PanelConfig::default()).unwrap(),
            FlakySink::default(),
        );
        m.sample(at(0), &frame(&[0])).unwrap();

        m.sink.failures = 1;
        assert!(matches!(
            m.sample(at(5), &frame(&[0, 1])),
            Err(MonitorError::Io { .. })
        ));
        assert_eq!(m.tracker().unwrap().last_status(), ZoneStatus::ALL_OFF);

        let retried = m.sample(at(5), &frame(&[0, 1])).unwrap();
        assert!(matches!(retried, Transition::Changed(_)));
        assert_eq!(
            m.sink().stored.zone_readings,
            vec![ZoneReading {
                start: at(0),
                end: at(5),
                status: ZoneStatus::ALL_OFF,
            }]
        );
        assert_eq!(m.tracker().unwrap().last_status(), z1_call());
    }
}
