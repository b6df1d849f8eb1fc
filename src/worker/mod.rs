//! The repost consumer.
//!
//! A single consumer drains the queue directory and reposts one item at a
//! time. It never runs two reposts concurrently.
//!
//! # Loop
//!
//! ```text
//! IDLE ──signal/poll──▶ DRAINING ──items──▶ PROCESSING ──▶ DRAINING ──empty──▶ IDLE
//! ```
//!
//! - **Draining** lists the directory and sorts pending ids ascending.
//! - **Processing** reposts each item in order: success deletes the queue
//!   file, a permanent rejection quarantines it, a transient failure stops
//!   the consumer with an error.
//! - **Idle** blocks on directory notifications. A creation signal is
//!   handled on its own without a drain; an overflow triggers a full drain.
//!   Without notifications the consumer polls.

mod consumer;


pub use consumer::{
    Consumer, ConsumerConfig, ConsumerError, DEFAULT_POLL_INTERVAL, Outcome, Result,
};
