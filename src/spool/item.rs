//! A single pending repost in the queue directory.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::persistence::fsync::fsync_dir;
use crate::types::EventId;

/// Suffix appended to a queue file name when it is quarantined.
pub const QUARANTINE_SUFFIX: &str = ".fail";

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum SpoolError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The directory change watcher could not be set up.
    #[error("queue watcher unavailable: {0}")]
    WatchUnavailable(String),

    /// A blocking queue operation did not run to completion.
    #[error("queue task failed: {0}")]
    Task(String),
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, SpoolError>;

/// A queue entry: `<queue_dir>/<id>.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    /// The event to repost.
    pub id: EventId,

    /// Path to the queue file.
    pub path: PathBuf,

    /// Path to the queue directory.
    pub queue_dir: PathBuf,
}

impl QueueItem {
    /// Creates the queue item for an event id.
    pub fn new(queue_dir: &Path, id: EventId) -> Self {
        QueueItem {
            id,
            path: queue_dir.join(id.file_name()),
            queue_dir: queue_dir.to_path_buf(),
        }
    }

    /// Returns the path the item is renamed to when quarantined.
    pub fn quarantine_path(&self) -> PathBuf {
        self.queue_dir
            .join(format!("{}{}", self.id.file_name(), QUARANTINE_SUFFIX))
    }

    /// Checks if the item is still pending.
    ///
    /// An error probing the path (other than absence) is returned rather than
    /// read as "gone".
    pub fn is_pending(&self) -> Result<bool> {
        Ok(self.path.try_exists()?)
    }

    /// Checks if the item has been quarantined.
    pub fn is_quarantined(&self) -> Result<bool> {
        Ok(self.quarantine_path().try_exists()?)
    }

    /// Removes the item after a successful repost.
    ///
    /// An item that is already gone counts as done.
    pub fn complete(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        fsync_dir(&self.queue_dir)?;
        Ok(())
    }

    /// Renames the item aside after a permanent rejection.
    pub fn quarantine(&self) -> Result<()> {
        std::fs::rename(&self.path, self.quarantine_path())?;
        fsync_dir(&self.queue_dir)?;
        Ok(())
    }
}

/// Runs a blocking queue operation on the blocking thread pool.
pub async fn off_runtime<T, F>(op: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| SpoolError::Task(format!("spawn_blocking failed: {e}")))?
}
