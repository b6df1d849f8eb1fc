//! The ingestion session: stream lines in, persisted events out.

use std::convert::Infallible;
use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use super::message::{StreamMessage, decode_line};
use crate::persistence::{PersistError, Persister};
use crate::watchdog::Watchdog;

/// How long the stream may stay silent before the session is abandoned.
///
/// The platform sends keep-alive lines every 30 seconds.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(90);

/// Lines read ahead of the session loop.
const LINE_BUFFER: usize = 64;

/// Errors that end an ingestion session.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The stream could not be opened.
    #[error("cannot open stream: {0}")]
    Connect(#[from] reqwest::Error),

    /// The stream endpoint answered with a non-200 status.
    #[error("cannot open stream: HTTP {0}")]
    Status(u16),

    /// The stream is not JSON.
    #[error("stream is not json: {0:?}")]
    NotJson(String),

    /// Reading from the stream failed.
    #[error("error reading stream: {0}")]
    Read(#[source] io::Error),

    /// The stream ended.
    #[error("stream closed")]
    Closed,

    /// A line was not a JSON object.
    #[error("bad json from stream: {0}")]
    BadJson(#[from] serde_json::Error),

    /// An event could not be saved.
    #[error("cannot save event: {0}")]
    Persist(#[from] PersistError),

    /// The blocking write of an event did not run to completion.
    #[error("save task failed: {0}")]
    Task(String),

    /// Nothing arrived for the whole stall timeout.
    #[error("stream timeout: nothing received for {0:?}")]
    Stalled(Duration),
}

/// Runs one ingestion session until it fails.
///
/// Lines are read by a background task. Every line, keep-alives included,
/// pets the watchdog; a bark ends the session with [`StreamError::Stalled`].
#[instrument(skip_all)]
pub async fn run_session<R>(
    reader: R,
    persister: &Persister,
    stall_timeout: Duration,
) -> Result<Infallible, StreamError>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (line_tx, line_rx) = mpsc::channel(LINE_BUFFER);
    let reader_task = tokio::spawn(read_lines(reader, line_tx));

    let result = consume_lines(line_rx, persister, stall_timeout).await;
    reader_task.abort();
    result
}

async fn consume_lines(
    mut lines: mpsc::Receiver<io::Result<Vec<u8>>>,
    persister: &Persister,
    stall_timeout: Duration,
) -> Result<Infallible, StreamError> {
    let mut dog = Watchdog::new(stall_timeout);
    info!("Starting to stream");

    loop {
        tokio::select! {
            line = lines.recv() => {
                let line = match line {
                    Some(Ok(line)) => line,
                    Some(Err(e)) => return Err(StreamError::Read(e)),
                    None => return Err(StreamError::Closed),
                };
                dog.pet();
                handle_line(&line, persister).await?;
            }
            _ = dog.barked() => return Err(StreamError::Stalled(stall_timeout)),
        }
    }
}

async fn handle_line(line: &[u8], persister: &Persister) -> Result<(), StreamError> {
    match decode_line(line)? {
        StreamMessage::KeepAlive => {}
        StreamMessage::Event(value) => {
            if let Some(text) = value.get("text") {
                debug!(%text, "got event");
            }
            // Persisting fsyncs files and directories; keep it off the runtime.
            let persister = persister.clone();
            let id = tokio::task::spawn_blocking(move || persister.persist_value(value))
                .await
                .map_err(|e| StreamError::Task(format!("spawn_blocking failed: {e}")))??;
            info!(%id, "saved event");
        }
        message @ StreamMessage::Notice(_) => {
            info!(kind = message.notice_kind().unwrap_or("empty"), "unhandled stream message");
        }
    }
    Ok(())
}

async fn read_lines<R>(mut reader: R, tx: mpsc::Sender<io::Result<Vec<u8>>>)
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let mut line = Vec::new();
        let item = match reader.read_until(b'\n', &mut line).await {
            Ok(0) => return,
            Ok(_) => Ok(line),
            Err(e) => Err(e),
        };
        let failed = item.is_err();
        if tx.send(item).await.is_err() || failed {
            return;
        }
    }
}
