//! hvacmon-store: SQLite persistence for zone and temperature readings.
//!
//! The on-disk schema is shared with existing hvacmon databases and must
//! not change:
//!
//! ```text
//! zone_readings(starttime TEXT, endtime TEXT,
//!               one_call INTEGER, one_valve INTEGER,
//!               two_call INTEGER, two_valve INTEGER,
//!               three_call INTEGER, three_valve INTEGER,
//!               four_call INTEGER, four_valve INTEGER)
//! temperature_readings(timestamp TEXT, temperature REAL)
//! ```
//!
//! Timestamps are written as ISO-8601 text with microseconds and a numeric
//! UTC offset; signals are stored as 0/1. Offset-less timestamps left by
//! older writers are read back as UTC.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, SecondsFormat};
use hvacmon_pipeline::{
    ReadingSink, SIGNAL_COUNT, TemperatureReading, Timestamp, ZoneReading, ZoneStatus,
};
use rusqlite::{Connection, params};

/// Errors raised by the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database rejected an operation.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored timestamp is not valid ISO-8601 with an offset.
    #[error("stored timestamp {text:?} is not RFC 3339: {source}")]
    Timestamp {
        /// The offending column value.
        text: String,
        /// Parse failure.
        source: chrono::ParseError,
    },
}

/// Format a timestamp the way it is stored.
#[must_use]
pub fn format_timestamp(timestamp: &Timestamp) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Format of offset-less timestamps in older databases, which are UTC.
const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

fn parse_timestamp(text: String) -> Result<Timestamp, StoreError> {
    match DateTime::parse_from_rfc3339(&text) {
        Ok(timestamp) => Ok(timestamp),
        Err(source) => NaiveDateTime::parse_from_str(&text, LEGACY_TIMESTAMP_FORMAT)
            .map(|naive| naive.and_utc().fixed_offset())
            .map_err(|_| StoreError::Timestamp { text, source }),
    }
}

/// SQLite-backed [`ReadingSink`].
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database at the given filesystem path and
    /// create the tables if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the file cannot be opened or the
    /// schema cannot be created.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        tracing::debug!(path = %path.display(), "reading store opened");
        Ok(store)
    }

    /// Open an in-memory database. Useful for testing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Create the schema if it does not already exist.
    fn migrate(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"CREATE TABLE IF NOT EXISTS "zone_readings"(
                starttime TEXT, endtime TEXT,
                one_call INTEGER, one_valve INTEGER,
                two_call INTEGER, two_valve INTEGER,
                three_call INTEGER, three_valve INTEGER,
                four_call INTEGER, four_valve INTEGER);
            CREATE TABLE IF NOT EXISTS "temperature_readings"(
                timestamp TEXT, temperature REAL);"#,
        )?;
        Ok(())
    }

    /// All zone readings in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] on query failure and
    /// [`StoreError::Timestamp`] if a stored timestamp cannot be parsed.
    pub fn zone_readings(&self) -> Result<Vec<ZoneReading>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT starttime, endtime,
                    one_call, one_valve, two_call, two_valve,
                    three_call, three_valve, four_call, four_valve
             FROM zone_readings
             ORDER BY rowid",
        )?;

        let rows = stmt.query_map([], |row| {
            let start: String = row.get(0)?;
            let end: String = row.get(1)?;
            let mut signals = [false; SIGNAL_COUNT];
            for (i, signal) in signals.iter_mut().enumerate() {
                let value: i64 = row.get(i + 2)?;
                *signal = value != 0;
            }
            Ok((start, end, signals))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (start, end, signals) = row?;
            result.push(ZoneReading {
                start: parse_timestamp(start)?,
                end: parse_timestamp(end)?,
                status: ZoneStatus::from_signals(signals),
            });
        }
        Ok(result)
    }

    /// All temperature readings in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] on query failure and
    /// [`StoreError::Timestamp`] if a stored timestamp cannot be parsed.
    pub fn temperature_readings(&self) -> Result<Vec<TemperatureReading>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT timestamp, temperature FROM temperature_readings ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            let timestamp: String = row.get(0)?;
            let fahrenheit: f64 = row.get(1)?;
            Ok((timestamp, fahrenheit))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (timestamp, fahrenheit) = row?;
            result.push(TemperatureReading {
                timestamp: parse_timestamp(timestamp)?,
                fahrenheit,
            });
        }
        Ok(result)
    }
}

impl ReadingSink for SqliteStore {
    type Error = StoreError;

    fn append_zone_reading(&mut self, reading: &ZoneReading) -> Result<(), StoreError> {
        let s = reading.status.signals().map(i64::from);
        self.conn.execute(
            "INSERT INTO zone_readings(starttime, endtime,
                                       one_call, one_valve,
                                       two_call, two_valve,
                                       three_call, three_valve,
                                       four_call, four_valve)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                format_timestamp(&reading.start),
                format_timestamp(&reading.end),
                s[0],
                s[1],
                s[2],
                s[3],
                s[4],
                s[5],
                s[6],
                s[7],
            ],
        )?;
        tracing::debug!(
            start = %reading.start,
            end = %reading.end,
            status = %reading.status,
            "zone reading stored"
        );
        Ok(())
    }

    fn append_temperature_reading(
        &mut self,
        reading: &TemperatureReading,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO temperature_readings(timestamp, temperature) VALUES (?1, ?2)",
            params![format_timestamp(&reading.timestamp), reading.fahrenheit],
        )?;
        tracing::debug!(
            timestamp = %reading.timestamp,
            fahrenheit = reading.fahrenheit,
            "temperature reading stored"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn timestamps_keep_microseconds_and_offset() {
        let t = ts("2018-03-04T06:30:05.123456-05:00");
        assert_eq!(format_timestamp(&t), "2018-03-04T06:30:05.123456-05:00");
        let whole = ts("2018-03-04T06:30:05Z");
        assert_eq!(format_timestamp(&whole), "2018-03-04T06:30:05.000000+00:00");
    }

    #[test]
    fn empty_store_has_no_readings() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.zone_readings().unwrap().is_empty());
        assert!(store.temperature_readings().unwrap().is_empty());
    }

    #[test]
    fn zone_signals_land_in_named_columns() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let reading = ZoneReading {
            start: ts("2018-03-04T06:30:00-05:00"),
            end: ts("2018-03-04T06:31:00-05:00"),
            status: ZoneStatus::from_signals([true, false, false, true, false, false, true, true]),
        };
        store.append_zone_reading(&reading).unwrap();

        let row: (String, i64, i64, i64, i64) = store
            .conn
            .query_row(
                "SELECT starttime, one_call, one_valve, two_valve, four_valve FROM zone_readings",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
            )
            .unwrap();
        assert_eq!(row, ("2018-03-04T06:30:00.000000-05:00".to_string(), 1, 0, 1, 1));

        assert_eq!(store.zone_readings().unwrap(), vec![reading]);
    }

    #[test]
    fn temperature_round_trip() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let reading = TemperatureReading {
            timestamp: ts("2018-03-04T11:30:00.5Z"),
            fahrenheit: 27.4,
        };
        store.append_temperature_reading(&reading).unwrap();
        assert_eq!(store.temperature_readings().unwrap(), vec![reading]);
    }

    #[test]
    fn offsetless_timestamps_read_as_utc() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .conn
            .execute_batch(
                "INSERT INTO temperature_readings(timestamp, temperature)
                     VALUES ('2018-03-04T11:30:00.123456', 27.4);
                 INSERT INTO zone_readings VALUES
                     ('2018-03-04T11:30:00', '2018-03-04T11:31:00.5', 1, 0, 0, 0, 0, 0, 0, 0);",
            )
            .unwrap();

        let temperatures = store.temperature_readings().unwrap();
        assert_eq!(
            temperatures[0].timestamp,
            ts("2018-03-04T11:30:00.123456+00:00")
        );
        let zones = store.zone_readings().unwrap();
        assert_eq!(zones[0].start, ts("2018-03-04T11:30:00Z"));
        assert_eq!(zones[0].end, ts("2018-03-04T11:31:00.5Z"));
        assert!(zones[0].status.zone(0).unwrap().call);
    }

    #[test]
    fn corrupt_timestamp_is_reported() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO temperature_readings VALUES ('yesterday', 1.0)",
                [],
            )
            .unwrap();
        assert!(matches!(
            store.temperature_readings(),
            Err(StoreError::Timestamp { .. })
        ));
    }
}
