//! Change notification for the queue directory.
//!
//! A dedicated thread blocks on inotify and forwards one signal per new
//! queue file. If the kernel event queue overflows, individual creations
//! may have been lost, so an explicit [`QueueSignal::Overflow`] tells the
//! consumer to fall back to a full drain.

use std::path::Path;
use std::thread::JoinHandle;

use tokio::sync::mpsc;

use crate::types::EventId;

use super::item::Result;

/// A wake-up for the queue consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueSignal {
    /// A queue file for this id appeared.
    Created(EventId),

    /// Notifications were dropped; the directory must be listed again.
    Overflow,

    /// The watcher stopped working. No further signals will arrive.
    Unavailable(String),
}

/// Handle to a running queue watcher.
///
/// Dropping it removes the inotify watch. The kernel answers with
/// `IN_IGNORED`, which wakes the watcher thread so it exits instead of
/// staying blocked in `read`.
pub struct QueueWatcher {
    #[cfg(target_os = "linux")]
    inotify: std::sync::Arc<nix::sys::inotify::Inotify>,
    #[cfg(target_os = "linux")]
    wd: nix::sys::inotify::WatchDescriptor,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for QueueWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueWatcher")
            .field("running", &self.thread.is_some())
            .finish_non_exhaustive()
    }
}

impl QueueWatcher {
    /// Stops the watcher and waits for its thread to exit.
    pub fn shutdown(mut self) {
        self.unwatch();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    #[cfg(target_os = "linux")]
    fn unwatch(&self) {
        // Fails only if the kernel already dropped the watch, which also
        // delivered IN_IGNORED.
        let _ = self.inotify.rm_watch(self.wd);
    }

    #[cfg(not(target_os = "linux"))]
    fn unwatch(&self) {}
}

impl Drop for QueueWatcher {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.unwatch();
        }
    }
}

/// Starts watching `queue_dir` for new queue files.
///
/// The watch is registered before this returns, so any file created after
/// the call is signalled. The thread exits when the returned
/// [`QueueWatcher`] is dropped, when the receiving side of `tx` is dropped
/// and another event arrives, or when the directory itself goes away.
///
/// # Errors
///
/// Returns `SpoolError::WatchUnavailable` if inotify cannot be initialized
/// or the directory cannot be watched.
#[cfg(target_os = "linux")]
pub fn spawn_queue_watcher(
    queue_dir: &Path,
    tx: mpsc::Sender<QueueSignal>,
) -> Result<QueueWatcher> {
    use std::sync::Arc;

    use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify};
    use tracing::debug;

    use super::drain::parse_item_name;
    use super::item::SpoolError;

    let inotify = Inotify::init(InitFlags::IN_CLOEXEC)
        .map_err(|e| SpoolError::WatchUnavailable(format!("inotify init failed: {e}")))?;
    // Hard links show up as IN_CREATE; files renamed in show up as IN_MOVED_TO.
    let wd = inotify
        .add_watch(
            queue_dir,
            AddWatchFlags::IN_CREATE | AddWatchFlags::IN_MOVED_TO,
        )
        .map_err(|e| {
            SpoolError::WatchUnavailable(format!(
                "cannot watch {}: {e}",
                queue_dir.display()
            ))
        })?;
    let inotify = Arc::new(inotify);

    let reader = Arc::clone(&inotify);
    let thread = std::thread::spawn(move || {
        loop {
            let events = match reader.read_events() {
                Ok(events) => events,
                Err(e) => {
                    let _ = tx.blocking_send(QueueSignal::Unavailable(format!(
                        "inotify read failed: {e}"
                    )));
                    return;
                }
            };

            for event in events {
                if event.mask.contains(AddWatchFlags::IN_IGNORED) {
                    debug!("queue watch removed, watcher exiting");
                    return;
                }
                let signal = if event.mask.contains(AddWatchFlags::IN_Q_OVERFLOW) {
                    QueueSignal::Overflow
                } else if let Some(id) = event
                    .name
                    .as_deref()
                    .and_then(|name| name.to_str())
                    .and_then(parse_item_name)
                {
                    QueueSignal::Created(id)
                } else {
                    continue;
                };

                if tx.blocking_send(signal).is_err() {
                    return;
                }
            }
        }
    });

    Ok(QueueWatcher {
        inotify,
        wd,
        thread: Some(thread),
    })
}

/// Change notification is only implemented on Linux; elsewhere the consumer
/// polls.
#[cfg(not(target_os = "linux"))]
pub fn spawn_queue_watcher(
    _queue_dir: &Path,
    _tx: mpsc::Sender<QueueSignal>,
) -> Result<QueueWatcher> {
    Err(super::item::SpoolError::WatchUnavailable(
        "no directory change notification on this platform".to_string(),
    ))
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use crate::spool::SpoolError;
    use std::time::Duration;
    use tempfile::tempdir;

    async fn next(rx: &mut mpsc::Receiver<QueueSignal>) -> QueueSignal {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher signalled in time")
            .expect("watcher still running")
    }

    #[tokio::test]
    async fn signals_created_queue_files() {
        let dir = tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let _handle = spawn_queue_watcher(dir.path(), tx).unwrap();

        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
        std::fs::write(dir.path().join("12.json"), b"{}").unwrap();

        assert_eq!(next(&mut rx).await, QueueSignal::Created(EventId(12)));
    }

    #[tokio::test]
    async fn signals_hard_linked_files() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("archive");
        let queue = dir.path().join("queue");
        std::fs::create_dir_all(&archive).unwrap();
        std::fs::create_dir_all(&queue).unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let _handle = spawn_queue_watcher(&queue, tx).unwrap();

        std::fs::write(archive.join("3.1.tmp"), b"{}").unwrap();
        std::fs::hard_link(archive.join("3.1.tmp"), queue.join("3.json")).unwrap();

        assert_eq!(next(&mut rx).await, QueueSignal::Created(EventId(3)));
    }

    #[test]
    fn missing_directory_is_unavailable() {
        let dir = tempdir().unwrap();
        let (tx, _rx) = mpsc::channel(1);

        let result = spawn_queue_watcher(&dir.path().join("missing"), tx);

        assert!(matches!(
            result,
            Err(SpoolError::WatchUnavailable(_))
        ));
    }

    #[test]
    fn shutdown_stops_the_thread_while_receiver_lives() {
        let dir = tempdir().unwrap();
        let (tx, _rx) = mpsc::channel(16);
        let watcher = spawn_queue_watcher(dir.path(), tx).unwrap();

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            watcher.shutdown();
            let _ = done_tx.send(());
        });

        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("watcher thread exited");
    }

    #[tokio::test]
    async fn dropped_watcher_closes_the_channel() {
        let dir = tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let watcher = spawn_queue_watcher(dir.path(), tx).unwrap();

        drop(watcher);

        let closed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher thread exited");
        assert_eq!(closed, None);
    }
}
