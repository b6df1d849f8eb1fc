//! Durable storage of streamed events.
//!
//! # File Layout
//!
//! ```text
//! <state_dir>/archive/<id>.json         # one artifact per event, never rewritten
//! <state_dir>/archive/<id>.<pid>.tmp    # in-flight write, invisible to readers
//! <state_dir>/queue/<id>.json           # hard link to the artifact: repost pending
//! ```
//!
//! # Crash Safety
//!
//! The queue entry is linked before the archive entry is renamed into place,
//! so an event is never archived without also being queued (at-least-once).
//! A rerun after a crash between the two steps finds the queue link already
//! present with identical content and finishes the rename.

pub mod event;
pub mod fsync;
pub mod persister;

pub use event::{CanonicalEvent, EventError};
pub use fsync::{fsync_dir, fsync_file};
pub use persister::{PersistError, Persister};
