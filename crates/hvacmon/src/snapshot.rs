//! Archive of the frames that triggered readings.
//!
//! Each recorded transition saves its frame as
//! `<root>/<category>/<start>_<end>.png`, where the category says why the
//! reading was written. Names have one-second resolution: a later reading
//! of the same category with the same start and end second replaces the
//! earlier file.

use std::path::PathBuf;

use hvacmon_pipeline::{Frame, Transition};

use crate::monitor::MonitorError;
use crate::sampler::FRAME_NAME_FORMAT;

/// Subdirectory for frames whose status differed from the previous one.
pub const STATE_CHANGE_DIR: &str = "statechange";
/// Subdirectory for quiescence-timeout heartbeats.
pub const TIMEOUT_DIR: &str = "timeouts";
/// Subdirectory for frames that could not be decoded.
pub const FAILURE_DIR: &str = "failures";

/// Writes trigger frames under a root directory.
#[derive(Debug, Clone)]
pub struct SnapshotArchive {
    root: PathBuf,
}

impl SnapshotArchive {
    /// Archive rooted at `root`. Directories are created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Where the frame for `transition` would be stored.
    ///
    /// `None` for [`Transition::Unchanged`], which records nothing.
    #[must_use]
    pub fn path_for(&self, transition: &Transition) -> Option<PathBuf> {
        let category = match transition {
            Transition::Unchanged => return None,
            Transition::Changed(_) => STATE_CHANGE_DIR,
            Transition::TimedOut(_) => TIMEOUT_DIR,
            Transition::Failed { .. } => FAILURE_DIR,
        };
        let reading = transition.reading()?;
        let name = format!(
            "{}_{}.png",
            reading.start.format(FRAME_NAME_FORMAT),
            reading.end.format(FRAME_NAME_FORMAT)
        );
        Some(self.root.join(category).join(name))
    }

    /// Save `frame` for `transition`, returning the written path.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Io`] if the category directory cannot be
    /// created and [`MonitorError::Snapshot`] if encoding or writing the
    /// PNG fails.
    pub fn save(
        &self,
        transition: &Transition,
        frame: &Frame,
    ) -> Result<Option<PathBuf>, MonitorError> {
        let Some(path) = self.path_for(transition) else {
            return Ok(None);
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| MonitorError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        frame
            .to_rgb()
            .save(&path)
            .map_err(|source| MonitorError::Snapshot {
                path: path.clone(),
                source,
            })?;
        Ok(Some(path))
    }
}
