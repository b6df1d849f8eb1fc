//! Crash-safe dual write of an event into the archive and the repost queue.
//!
//! The write sequence for one event is:
//! 1. Canonicalize and serialize the event
//! 2. Write `<archive>/<id>.<pid>.tmp` and fsync it
//! 3. Unless the event is a reshare, hard-link the temp file to `<queue>/<id>.json`
//!    and fsync the queue directory
//! 4. Rename the temp file to `<archive>/<id>.json` and fsync the archive directory
//!
//! Every step is atomic on its own. A crash can leave at most one orphaned
//! temp file behind, which nothing else reads.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use super::event::{CanonicalEvent, EventError};
use super::fsync::{fsync_dir, fsync_file};
use crate::types::EventId;

/// Errors that can occur while persisting an event.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The event could not be canonicalized (missing or malformed id).
    #[error("bad event: {0}")]
    Event(#[from] EventError),

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A queue entry for this id exists with different content.
    #[error("queue entry for {id} already exists with different content: {}", .path.display())]
    QueueConflict { id: EventId, path: PathBuf },
}

/// Result type for persist operations.
pub type Result<T> = std::result::Result<T, PersistError>;

/// Writes events into the archive and queue directories.
#[derive(Debug, Clone)]
pub struct Persister {
    archive_dir: PathBuf,
    queue_dir: PathBuf,
}

impl Persister {
    /// Creates a persister for the given directories.
    ///
    /// Both directories must already exist and live on the same filesystem,
    /// since queue entries are hard links to archive temp files.
    pub fn new(archive_dir: impl Into<PathBuf>, queue_dir: impl Into<PathBuf>) -> Self {
        Persister {
            archive_dir: archive_dir.into(),
            queue_dir: queue_dir.into(),
        }
    }

    /// Returns the archive directory.
    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Returns the queue directory.
    pub fn queue_dir(&self) -> &Path {
        &self.queue_dir
    }

    /// Returns the archive path of an event.
    pub fn archive_path(&self, id: EventId) -> PathBuf {
        self.archive_dir.join(id.file_name())
    }

    /// Returns the queue path of an event.
    pub fn queue_path(&self, id: EventId) -> PathBuf {
        self.queue_dir.join(id.file_name())
    }

    /// Returns the temp path this process uses while writing an event.
    pub fn temp_path(&self, id: EventId) -> PathBuf {
        self.archive_dir
            .join(format!("{}.{}.tmp", id, std::process::id()))
    }

    /// Canonicalizes a decoded record and persists it.
    pub fn persist_value(&self, value: Value) -> Result<EventId> {
        let event = CanonicalEvent::from_value(value)?;
        self.persist(&event)
    }

    /// Persists an event, returning its identifier.
    ///
    /// Calling this again for an event that is already archived is a no-op,
    /// so redelivery from the stream never produces a second queue entry.
    ///
    /// # Errors
    ///
    /// Returns `PersistError::QueueConflict` if a queue entry with different
    /// content already exists for the id. Returns `PersistError::Io` for
    /// filesystem errors; the temp file is removed before returning.
    pub fn persist(&self, event: &CanonicalEvent) -> Result<EventId> {
        let id = event.id();
        let archive_path = self.archive_path(id);

        if archive_path.try_exists()? {
            debug!(%id, "event already archived");
            return Ok(id);
        }

        let bytes = event.to_bytes()?;
        let temp_path = self.temp_path(id);

        // A temp file left by an earlier process with the same pid may share
        // its inode with a queue entry; drop the name instead of truncating.
        match std::fs::remove_file(&temp_path) {
            Ok(()) => debug!(%id, "removed stale temp file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)?;
            let written = file.write_all(&bytes).and_then(|()| fsync_file(&file));
            if let Err(e) = written {
                drop(file);
                let _ = std::fs::remove_file(&temp_path);
                return Err(e.into());
            }
        }

        match self.link_and_rename(event, &temp_path, &archive_path, &bytes) {
            Ok(()) => Ok(id),
            Err(e) => {
                let _ = std::fs::remove_file(&temp_path);
                Err(e)
            }
        }
    }

    fn link_and_rename(
        &self,
        event: &CanonicalEvent,
        temp_path: &Path,
        archive_path: &Path,
        bytes: &[u8],
    ) -> Result<()> {
        let id = event.id();

        if event.is_reshare() {
            info!(%id, "not queueing a reshare");
        } else {
            // Queue first: an archived event must always have been queued.
            let queue_path = self.queue_path(id);
            match std::fs::hard_link(temp_path, &queue_path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    // Left by an earlier run that crashed before the rename.
                    if std::fs::read(&queue_path)? != bytes {
                        return Err(PersistError::QueueConflict {
                            id,
                            path: queue_path,
                        });
                    }
                    debug!(%id, "queue entry from an earlier run already present");
                }
                Err(e) => return Err(e.into()),
            }
            fsync_dir(&self.queue_dir)?;
        }

        std::fs::rename(temp_path, archive_path)?;
        fsync_dir(&self.archive_dir)?;

        debug!(%id, reshare = event.is_reshare(), "event persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use tempfile::{TempDir, tempdir};

    fn setup() -> (TempDir, Persister) {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("archive");
        let queue = dir.path().join("queue");
        std::fs::create_dir_all(&archive).unwrap();
        std::fs::create_dir_all(&queue).unwrap();
        (dir, Persister::new(archive, queue))
    }

    fn event(id: u64) -> CanonicalEvent {
        CanonicalEvent::from_value(json!({
            "id": id,
            "id_str": id.to_string(),
            "text": format!("event {id}"),
        }))
        .unwrap()
    }

    fn reshare(id: u64) -> CanonicalEvent {
        CanonicalEvent::from_value(json!({
            "id_str": id.to_string(),
            "text": "RT",
            "retweeted_status": {"id_str": "1"},
        }))
        .unwrap()
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn persist_writes_archive_and_queue() {
        let (_dir, persister) = setup();

        let id = persister.persist(&event(5)).unwrap();

        assert_eq!(id, EventId(5));
        assert_eq!(names(persister.archive_dir()), vec!["5.json"]);
        assert_eq!(names(persister.queue_dir()), vec!["5.json"]);

        let archived = std::fs::read(persister.archive_path(id)).unwrap();
        let queued = std::fs::read(persister.queue_path(id)).unwrap();
        assert_eq!(archived, queued);
    }

    #[test]
    fn archive_drops_numeric_id() {
        let (_dir, persister) = setup();

        let id = persister.persist(&event(9)).unwrap();

        let archived: Value =
            serde_json::from_slice(&std::fs::read(persister.archive_path(id)).unwrap()).unwrap();
        assert_eq!(archived.get("id"), None);
        assert_eq!(archived.get("id_str"), Some(&json!("9")));
    }

    #[test]
    fn reshare_is_archived_but_not_queued() {
        let (_dir, persister) = setup();

        persister.persist(&reshare(2)).unwrap();

        assert_eq!(names(persister.archive_dir()), vec!["2.json"]);
        assert!(names(persister.queue_dir()).is_empty());
    }

    #[test]
    fn persist_twice_is_idempotent() {
        let (_dir, persister) = setup();

        persister.persist(&event(5)).unwrap();
        persister.persist(&event(5)).unwrap();

        assert_eq!(names(persister.archive_dir()), vec!["5.json"]);
        assert_eq!(names(persister.queue_dir()), vec!["5.json"]);
    }

    #[test]
    fn persist_after_consumption_does_not_requeue() {
        let (_dir, persister) = setup();

        let id = persister.persist(&event(5)).unwrap();
        std::fs::remove_file(persister.queue_path(id)).unwrap();
        persister.persist(&event(5)).unwrap();

        assert!(names(persister.queue_dir()).is_empty());
    }

    /// Crash between linking the queue entry and renaming the archive entry.
    ///
    /// The temp file and the queue link exist, the archive entry does not.
    /// Rerunning persist finishes the job.
    #[test]
    fn recovers_from_crash_between_link_and_rename() {
        let (_dir, persister) = setup();
        let ev = event(42);
        let bytes = ev.to_bytes().unwrap();

        let stale_temp = persister.archive_dir().join("42.99999.tmp");
        std::fs::write(&stale_temp, &bytes).unwrap();
        std::fs::hard_link(&stale_temp, persister.queue_path(EventId(42))).unwrap();

        let id = persister.persist(&ev).unwrap();

        assert_eq!(id, EventId(42));
        assert_eq!(std::fs::read(persister.archive_path(id)).unwrap(), bytes);
        assert_eq!(std::fs::read(persister.queue_path(id)).unwrap(), bytes);
        assert!(!persister.temp_path(id).exists());
    }

    #[test]
    fn conflicting_queue_entry_is_an_error() {
        let (_dir, persister) = setup();
        std::fs::write(persister.queue_path(EventId(42)), b"something else").unwrap();

        let result = persister.persist(&event(42));

        assert!(matches!(
            result,
            Err(PersistError::QueueConflict { id: EventId(42), .. })
        ));
        assert!(!persister.temp_path(EventId(42)).exists());
        assert!(!persister.archive_path(EventId(42)).exists());
        assert_eq!(
            std::fs::read(persister.queue_path(EventId(42))).unwrap(),
            b"something else"
        );
    }

    /// A crashed process with the same pid left its temp file linked to a
    /// queue entry whose content differs from the new event.
    #[test]
    fn same_pid_stale_temp_does_not_rewrite_queue_entry() {
        let (_dir, persister) = setup();
        let stale_temp = persister.temp_path(EventId(42));
        std::fs::write(&stale_temp, b"OLD DIFFERENT CONTENT").unwrap();
        std::fs::hard_link(&stale_temp, persister.queue_path(EventId(42))).unwrap();

        let result = persister.persist_value(json!({"id_str": "42", "text": "new"}));

        assert!(matches!(
            result,
            Err(PersistError::QueueConflict { id: EventId(42), .. })
        ));
        assert_eq!(
            std::fs::read(persister.queue_path(EventId(42))).unwrap(),
            b"OLD DIFFERENT CONTENT"
        );
        assert!(!stale_temp.exists());
        assert!(!persister.archive_path(EventId(42)).exists());
    }

    #[test]
    fn same_pid_stale_temp_with_matching_content_completes() {
        let (_dir, persister) = setup();
        let ev = event(43);
        let bytes = ev.to_bytes().unwrap();
        let stale_temp = persister.temp_path(EventId(43));
        std::fs::write(&stale_temp, &bytes).unwrap();
        std::fs::hard_link(&stale_temp, persister.queue_path(EventId(43))).unwrap();

        persister.persist(&ev).unwrap();

        assert_eq!(std::fs::read(persister.archive_path(EventId(43))).unwrap(), bytes);
        assert_eq!(std::fs::read(persister.queue_path(EventId(43))).unwrap(), bytes);
        assert!(!stale_temp.exists());
    }

    #[test]
    fn io_failure_leaves_no_temp_file() {
        let (dir, _) = setup();
        // Queue directory does not exist, so the link fails.
        let persister = Persister::new(dir.path().join("archive"), dir.path().join("missing"));

        let result = persister.persist(&event(3));

        assert!(matches!(result, Err(PersistError::Io(_))));
        assert!(names(persister.archive_dir()).is_empty());
    }

    #[test]
    fn persist_value_rejects_missing_id() {
        let (_dir, persister) = setup();

        let result = persister.persist_value(json!({"id": 1, "text": "no id_str"}));

        assert!(matches!(
            result,
            Err(PersistError::Event(EventError::MissingId))
        ));
        assert!(names(persister.archive_dir()).is_empty());
    }

    proptest! {
        /// Archive and queue agree for any mix of plain events and reshares.
        #[test]
        fn queue_is_archive_minus_reshares(
            events in prop::collection::btree_map(any::<u64>(), any::<bool>(), 1..20),
        ) {
            let (_dir, persister) = setup();

            for (&id, &is_reshare) in &events {
                let ev = if is_reshare { reshare(id) } else { event(id) };
                persister.persist(&ev).unwrap();
            }

            let archived: Vec<String> = events.keys().map(|id| EventId(*id).file_name()).collect();
            let queued: Vec<String> = events
                .iter()
                .filter(|(_, reshare)| !**reshare)
                .map(|(id, _)| EventId(*id).file_name())
                .collect();

            let mut archived_sorted = archived.clone();
            archived_sorted.sort();
            let mut queued_sorted = queued.clone();
            queued_sorted.sort();

            prop_assert_eq!(names(persister.archive_dir()), archived_sorted);
            prop_assert_eq!(names(persister.queue_dir()), queued_sorted);
        }
    }
}
