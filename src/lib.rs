//! Repost Spool - capture a live event stream to disk and republish each event
//! exactly once through a crash-safe on-disk queue.
//!
//! Ingestion ([`stream`]) writes every event into an archive and, unless it
//! is a reshare, into a queue directory ([`persistence`]). A separate consumer
//! ([`worker`]) drains the queue in id order and invokes the republish action
//! ([`invoker`]) for each item.

pub mod config;
pub mod invoker;
pub mod persistence;
pub mod spool;
pub mod stream;
pub mod types;
pub mod watchdog;
pub mod worker;
