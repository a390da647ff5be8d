//! Change detection over a stream of decode outcomes.
//!
//! The tracker remembers one thing: the last status and when it began.
//! Each sample either closes that interval as a [`ZoneReading`] (status
//! changed, decode failed, or the quiescence timeout elapsed) or leaves
//! it open. The reading always describes the *previous* status, i.e. how
//! long it held, never the new one.
//!
//! The transition is the pure function [`TrackerState::step`];
//! [`StatusTracker`] only owns the current state and enforces timestamp
//! ordering.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::decode::{DecodeFailure, DecodeOutcome};
use crate::types::{PanelError, Timestamp, ZoneReading, ZoneStatus};

/// Snapshot of everything the tracker knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerState {
    /// Start of the currently open interval.
    pub last_timestamp: Timestamp,
    /// Status held since `last_timestamp`.
    pub last_status: ZoneStatus,
}

/// What a single sample did to the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    /// Same status, timeout not reached: nothing to record.
    Unchanged,
    /// The status changed; the reading covers the previous status.
    Changed(ZoneReading),
    /// The status held past the quiescence timeout; heartbeat reading.
    TimedOut(ZoneReading),
    /// The frame could not be decoded; the open interval is closed and
    /// the baseline reset to all-off.
    Failed {
        /// Reading for the interval that was open.
        reading: ZoneReading,
        /// Why decoding failed.
        reason: DecodeFailure,
    },
}

impl Transition {
    /// The reading to persist, if any.
    #[must_use]
    pub const fn reading(&self) -> Option<ZoneReading> {
        match self {
            Self::Unchanged => None,
            Self::Changed(reading) | Self::TimedOut(reading) | Self::Failed { reading, .. } => {
                Some(*reading)
            }
        }
    }
}

impl TrackerState {
    /// Fresh state: all-off since `timestamp`.
    #[must_use]
    pub const fn new(timestamp: Timestamp) -> Self {
        Self {
            last_timestamp: timestamp,
            last_status: ZoneStatus::ALL_OFF,
        }
    }

    /// Apply one sample.
    ///
    /// Rules, first match wins:
    ///
    /// 1. decode failed: emit the open interval, reset to all-off at
    ///    `timestamp`;
    /// 2. status differs: emit the open interval, adopt the new status at
    ///    `timestamp`;
    /// 3. more than `timeout` since `last_timestamp`: emit the open
    ///    interval, advance `last_timestamp` only;
    /// 4. otherwise nothing changes.
    ///
    /// Ordering is the caller's responsibility; see
    /// [`StatusTracker::observe`] for the checked entry point.
    #[must_use]
    pub fn step(
        self,
        timestamp: Timestamp,
        outcome: DecodeOutcome,
        timeout: Duration,
    ) -> (Self, Transition) {
        let reading = ZoneReading {
            start: self.last_timestamp,
            end: timestamp,
            status: self.last_status,
        };

        match outcome {
            DecodeOutcome::Failed(reason) => (
                Self::new(timestamp),
                Transition::Failed { reading, reason },
            ),
            DecodeOutcome::Decoded(status) if status != self.last_status => (
                Self {
                    last_timestamp: timestamp,
                    last_status: status,
                },
                Transition::Changed(reading),
            ),
            DecodeOutcome::Decoded(_) if self.elapsed_exceeds(timestamp, timeout) => (
                Self {
                    last_timestamp: timestamp,
                    ..self
                },
                Transition::TimedOut(reading),
            ),
            DecodeOutcome::Decoded(_) => (self, Transition::Unchanged),
        }
    }

    fn elapsed_exceeds(&self, timestamp: Timestamp, timeout: Duration) -> bool {
        (timestamp - self.last_timestamp)
            .to_std()
            .is_ok_and(|elapsed| elapsed > timeout)
    }
}

/// Stateful wrapper around [`TrackerState::step`] for one panel.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    state: TrackerState,
    quiescence_timeout: Duration,
}

impl StatusTracker {
    /// Start tracking at `timestamp` with an all-off status.
    #[must_use]
    pub const fn new(timestamp: Timestamp, quiescence_timeout: Duration) -> Self {
        Self {
            state: TrackerState::new(timestamp),
            quiescence_timeout,
        }
    }

    /// Start tracking from an initial decode.
    ///
    /// A failed initial decode is not fatal; it degrades to all-off.
    #[must_use]
    pub fn from_initial(
        timestamp: Timestamp,
        outcome: DecodeOutcome,
        quiescence_timeout: Duration,
    ) -> Self {
        Self {
            state: TrackerState {
                last_timestamp: timestamp,
                last_status: outcome.status().unwrap_or(ZoneStatus::ALL_OFF),
            },
            quiescence_timeout,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> TrackerState {
        self.state
    }

    /// Status held since [`last_timestamp`](Self::last_timestamp).
    #[must_use]
    pub const fn last_status(&self) -> ZoneStatus {
        self.state.last_status
    }

    /// Start of the currently open interval.
    #[must_use]
    pub const fn last_timestamp(&self) -> Timestamp {
        self.state.last_timestamp
    }

    /// Configured heartbeat interval.
    #[must_use]
    pub const fn quiescence_timeout(&self) -> Duration {
        self.quiescence_timeout
    }

    /// Ingest one sample and return the reading to persist, if any.
    ///
    /// # Errors
    ///
    /// Returns [`PanelError::NonMonotonicTimestamp`] if `timestamp` is not
    /// strictly after the last processed sample. The state is unchanged.
    pub fn observe(
        &mut self,
        timestamp: Timestamp,
        outcome: DecodeOutcome,
    ) -> Result<Option<ZoneReading>, PanelError> {
        self.observe_transition(timestamp, outcome)
            .map(|transition| transition.reading())
    }

    /// Like [`observe`](Self::observe), but reports which rule fired.
    ///
    /// # Errors
    ///
    /// Returns [`PanelError::NonMonotonicTimestamp`] if `timestamp` is not
    /// strictly after the last processed sample. The state is unchanged.
    pub fn observe_transition(
        &mut self,
        timestamp: Timestamp,
        outcome: DecodeOutcome,
    ) -> Result<Transition, PanelError> {
        let (next, transition) = self.peek(timestamp, outcome)?;
        self.commit(next);
        Ok(transition)
    }

    /// Compute what a sample would do without applying it.
    ///
    /// Pair with [`commit`](Self::commit) once the reading, if any, has
    /// been persisted; until then the same sample can be offered again.
    ///
    /// # Errors
    ///
    /// Returns [`PanelError::NonMonotonicTimestamp`] if `timestamp` is not
    /// strictly after the last processed sample.
    pub fn peek(
        &self,
        timestamp: Timestamp,
        outcome: DecodeOutcome,
    ) -> Result<(TrackerState, Transition), PanelError> {
        if timestamp <= self.state.last_timestamp {
            return Err(PanelError::NonMonotonicTimestamp {
                last: self.state.last_timestamp,
                timestamp,
            });
        }
        Ok(self.state.step(timestamp, outcome, self.quiescence_timeout))
    }

    /// Adopt a state returned by [`peek`](Self::peek).
    pub const fn commit(&mut self, state: TrackerState) {
        self.state = state;
    }
}
