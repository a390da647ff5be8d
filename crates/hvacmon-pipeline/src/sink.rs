//! The boundary between the pipeline and durable storage.
//!
//! The pipeline never performs I/O itself. A host wires a
//! [`ReadingSink`] implementation (e.g. `hvacmon-store`'s SQLite store)
//! behind the tracker.

use std::convert::Infallible;

use crate::types::{TemperatureReading, ZoneReading};

/// Append-only destination for readings.
///
/// Readings are immutable once appended; implementations must not
/// reorder or coalesce them.
pub trait ReadingSink {
    /// Error raised when a reading cannot be stored.
    type Error;

    /// Persist one closed zone interval.
    ///
    /// # Errors
    ///
    /// Implementation-defined storage failure.
    fn append_zone_reading(&mut self, reading: &ZoneReading) -> Result<(), Self::Error>;

    /// Persist one temperature sample.
    ///
    /// # Errors
    ///
    /// Implementation-defined storage failure.
    fn append_temperature_reading(
        &mut self,
        reading: &TemperatureReading,
    ) -> Result<(), Self::Error>;
}

/// In-memory sink that keeps everything it is given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySink {
    /// Zone readings in append order.
    pub zone_readings: Vec<ZoneReading>,
    /// Temperature readings in append order.
    pub temperature_readings: Vec<TemperatureReading>,
}

impl ReadingSink for MemorySink {
    type Error = Infallible;

    fn append_zone_reading(&mut self, reading: &ZoneReading) -> Result<(), Self::Error> {
        self.zone_readings.push(*reading);
        Ok(())
    }

    fn append_temperature_reading(
        &mut self,
        reading: &TemperatureReading,
    ) -> Result<(), Self::Error> {
        self.temperature_readings.push(*reading);
        Ok(())
    }
}

impl<S: ReadingSink + ?Sized> ReadingSink for &mut S {
    type Error = S::Error;

    fn append_zone_reading(&mut self, reading: &ZoneReading) -> Result<(), Self::Error> {
        (**self).append_zone_reading(reading)
    }

    fn append_temperature_reading(
        &mut self,
        reading: &TemperatureReading,
    ) -> Result<(), Self::Error> {
        (**self).append_temperature_reading(reading)
    }
}
