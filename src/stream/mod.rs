//! Ingestion of the incoming event stream.
//!
//! # Session Flow
//!
//! 1. Open the filter stream with a signed POST ([`client`])
//! 2. A background task reads the body line by line
//! 3. The session loop pets the watchdog for every line, decodes it
//!    ([`message`]) and hands events to the persister
//! 4. Any read error, end of stream, bad record or watchdog bark ends the
//!    session with an error; reconnecting is the caller's job

pub mod client;
pub mod message;
pub mod session;

pub use client::{DEFAULT_STREAM_URL, StreamClient, merge_keywords};
pub use message::{StreamMessage, decode_line};
pub use session::{DEFAULT_STALL_TIMEOUT, StreamError, run_session};
