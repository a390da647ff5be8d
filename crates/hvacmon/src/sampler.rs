//! Frame sources.
//!
//! [`DirectorySampler`] replays frames saved on disk, named by capture
//! time (`2018-03-04_06-30-05.png`, optionally with a fractional second
//! `2018-03-04_06-30-05.250000.png`), in timestamp order.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use hvacmon_pipeline::{Frame, Timestamp};

use crate::monitor::MonitorError;

/// `strftime` pattern of frame file stems (and snapshot names).
pub const FRAME_NAME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Frame file extensions the sampler picks up.
const FRAME_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

/// Which UTC offset timestamps carry.
///
/// A deployment must stick to one; mixing them makes persisted intervals
/// hard to compare by eye.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetPolicy {
    /// The host's local offset at the time of capture.
    #[default]
    Local,
    /// UTC (`+00:00`).
    Utc,
}

impl OffsetPolicy {
    /// The current time under this policy.
    #[must_use]
    pub fn now(self) -> Timestamp {
        match self {
            Self::Local => Local::now().fixed_offset(),
            Self::Utc => Utc::now().fixed_offset(),
        }
    }

    /// Attach an offset to a wall-clock time.
    ///
    /// Returns `None` for local times skipped by a daylight-saving jump.
    /// Local times repeated when clocks fall back always take the earlier
    /// offset, so frames from the second pass through that hour sort among
    /// the first; use [`Utc`](Self::Utc) where that matters.
    #[must_use]
    pub fn attach(self, naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        match self {
            Self::Local => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.fixed_offset()),
            Self::Utc => Some(naive.and_utc().fixed_offset()),
        }
    }
}

/// One captured frame.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Capture time.
    pub timestamp: Timestamp,
    /// The image.
    pub frame: Frame,
    /// Where the frame came from.
    pub source: PathBuf,
}

/// Parse a capture time from a frame file name.
#[must_use]
pub fn parse_frame_name(path: &Path, policy: OffsetPolicy) -> Option<Timestamp> {
    let stem = path.file_stem()?.to_str()?;
    let naive = NaiveDateTime::parse_from_str(stem, &format!("{FRAME_NAME_FORMAT}%.f")).ok()?;
    policy.attach(naive)
}

/// Replays a directory of frame files as a camera.
#[derive(Debug)]
pub struct DirectorySampler {
    pending: std::vec::IntoIter<(Timestamp, PathBuf)>,
}

impl DirectorySampler {
    /// Index the frames in `dir`.
    ///
    /// Files without an image extension are ignored; image files whose
    /// names do not parse as timestamps are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Io`] if the directory cannot be listed.
    pub fn open(dir: &Path, policy: OffsetPolicy) -> Result<Self, MonitorError> {
        let io_err = |source| MonitorError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut frames = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let is_frame = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if !is_frame {
                continue;
            }
            match parse_frame_name(&path, policy) {
                Some(timestamp) => frames.push((timestamp, path)),
                None => {
                    tracing::warn!(path = %path.display(), "skipping frame with unparseable name");
                }
            }
        }
        frames.sort();
        tracing::info!(dir = %dir.display(), frames = frames.len(), "indexed frame directory");

        Ok(Self {
            pending: frames.into_iter(),
        })
    }
}

impl Iterator for DirectorySampler {
    type Item = Result<Sample, MonitorError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (timestamp, path) = self.pending.next()?;
        let sample = std::fs::read(&path)
            .map_err(|source| MonitorError::Io {
                path: path.clone(),
                source,
            })
            .and_then(|bytes| {
                Frame::load(&bytes).map_err(|source| MonitorError::Frame {
                    path: path.clone(),
                    source,
                })
            })
            .map(|frame| Sample {
                timestamp,
                frame,
                source: path,
            });
        Some(sample)
    }
}
