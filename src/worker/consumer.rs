//! Queue consumer event loop.

use std::convert::Infallible;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::invoker::{ActionError, ActionInvoker, is_permanent};
use crate::spool::{
    DEFAULT_BATCH_SIZE, QueueItem, QueueSignal, SpoolError, drain_pending, off_runtime,
    spawn_queue_watcher,
};
use crate::types::EventId;

/// Sleep between drains when no change notification is available.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Notifications buffered between the watcher thread and the consumer.
const SIGNAL_BUFFER: usize = 1024;

/// Errors that stop the consumer.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// Queue directory operation failed.
    #[error("queue error: {0}")]
    Spool(#[from] SpoolError),

    /// A repost failed in a way that may succeed later.
    #[error("cannot repost {id}: {source}")]
    Action {
        id: EventId,
        #[source]
        source: ActionError,
    },
}

/// Result type for consumer operations.
pub type Result<T> = std::result::Result<T, ConsumerError>;

/// What happened to one queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Reposted and removed from the queue.
    Reposted,

    /// Permanently rejected and renamed aside.
    Quarantined,

    /// Already gone when the consumer got to it.
    Skipped,
}

/// Configuration for a consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Directory holding the queue files.
    pub queue_dir: PathBuf,

    /// Directory entries read per listing batch.
    pub batch_size: usize,

    /// Sleep between drains when polling.
    pub poll_interval: Duration,

    /// Whether to use directory change notification.
    pub watch: bool,
}

impl ConsumerConfig {
    /// Creates a configuration with default batching and notification on.
    pub fn new(queue_dir: impl Into<PathBuf>) -> Self {
        ConsumerConfig {
            queue_dir: queue_dir.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            watch: true,
        }
    }

    /// Sets the polling interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Turns directory change notification off, so the consumer only polls.
    pub fn polling_only(mut self) -> Self {
        self.watch = false;
        self
    }
}

/// Drains the queue directory through an [`ActionInvoker`].
#[derive(Debug)]
pub struct Consumer<I> {
    config: ConsumerConfig,
    invoker: I,
}

impl<I: ActionInvoker> Consumer<I> {
    pub fn new(config: ConsumerConfig, invoker: I) -> Self {
        Consumer { config, invoker }
    }

    /// Runs the consumer until an error stops it.
    ///
    /// The watcher is started before the first drain, so an item created
    /// between the listing and the wait still wakes the consumer.
    pub async fn run(&self) -> Result<Infallible> {
        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
        let watcher = if self.config.watch {
            match spawn_queue_watcher(&self.config.queue_dir, tx) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    warn!(error = %e, "Falling back to polling");
                    None
                }
            }
        } else {
            None
        };

        let signals = watcher.is_some().then_some(rx);
        let result = self.run_with_signals(signals).await;
        drop(watcher);
        result
    }

    /// Runs the consumer loop fed by `signals`, or by polling when `None`.
    ///
    /// An `Overflow` signal forces a full drain. An `Unavailable` signal, or
    /// the channel closing, switches to polling for good.
    #[instrument(skip_all, fields(queue = %self.config.queue_dir.display()))]
    pub async fn run_with_signals(
        &self,
        mut signals: Option<mpsc::Receiver<QueueSignal>>,
    ) -> Result<Infallible> {
        info!("Starting to repost");
        loop {
            while self.drain_once().await? > 0 {}

            // Idle until something says a drain is worth doing.
            loop {
                let Some(rx) = signals.as_mut() else {
                    tokio::time::sleep(self.config.poll_interval).await;
                    break;
                };
                match rx.recv().await {
                    Some(QueueSignal::Created(id)) => {
                        let item = QueueItem::new(&self.config.queue_dir, id);
                        self.process(&item).await?;
                    }
                    Some(QueueSignal::Overflow) => {
                        warn!("Queue notifications overflowed, draining");
                        break;
                    }
                    Some(QueueSignal::Unavailable(reason)) => {
                        warn!(%reason, "Queue watcher failed, falling back to polling");
                        signals = None;
                        break;
                    }
                    None => {
                        warn!("Queue watcher stopped, falling back to polling");
                        signals = None;
                        break;
                    }
                }
            }
        }
    }

    /// Lists the queue once and processes every pending item in id order.
    ///
    /// Returns the number of items found.
    pub async fn drain_once(&self) -> Result<usize> {
        let queue_dir = self.config.queue_dir.clone();
        let batch_size = self.config.batch_size;
        let pending = off_runtime(move || drain_pending(&queue_dir, batch_size)).await?;
        if !pending.is_empty() {
            debug!(pending = pending.len(), "Drained queue");
        }
        for item in &pending {
            self.process(item).await?;
        }
        Ok(pending.len())
    }

    /// Reposts one item and retires it.
    ///
    /// # Errors
    ///
    /// Returns `ConsumerError::Action` for a transient failure; the item is
    /// left in place. Returns `ConsumerError::Spool` if the item cannot be
    /// checked, removed or quarantined.
    pub async fn process(&self, item: &QueueItem) -> Result<Outcome> {
        let id = item.id;
        let current = item.clone();
        if !off_runtime(move || current.is_pending()).await? {
            debug!(%id, "Queue item already handled");
            return Ok(Outcome::Skipped);
        }

        match self.invoker.invoke(id).await {
            Ok(()) => {
                let done = item.clone();
                off_runtime(move || done.complete()).await?;
                info!(%id, "Reposted");
                Ok(Outcome::Reposted)
            }
            Err(e) if is_permanent(&e) => {
                warn!(%id, error = %e, "Repost refused, quarantining");
                let failed = item.clone();
                off_runtime(move || failed.quarantine()).await?;
                Ok(Outcome::Quarantined)
            }
            Err(e) => Err(ConsumerError::Action { id, source: e }),
        }
    }
}
