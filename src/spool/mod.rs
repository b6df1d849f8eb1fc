//! Directory-backed repost queue.
//!
//! Each pending repost is one file in the queue directory:
//!
//! ```text
//! <id>.json        - pending (hard link to the archived event)
//! <id>.json.fail   - quarantined (permanently rejected, never read again)
//! ```
//!
//! Deleting `<id>.json` marks the repost done. Anything else in the
//! directory (temp files, notes, quarantined items) is not work and is
//! ignored by the drain.

pub mod drain;
pub mod item;
pub mod watch;

pub use drain::{DEFAULT_BATCH_SIZE, drain_pending, parse_item_name};
pub use item::{QUARANTINE_SUFFIX, QueueItem, SpoolError, off_runtime};
pub use watch::{QueueSignal, QueueWatcher, spawn_queue_watcher};
