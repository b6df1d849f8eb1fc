//! Liveness watchdog for the incoming stream.
//!
//! The owner calls [`Watchdog::pet`] whenever the stream shows signs of life
//! and races [`Watchdog::barked`] against its own work. If no pet arrives
//! for the whole timeout, the watchdog barks once and stops for good.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

/// The alarm: no pet arrived within the timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bark;

/// A one-shot stall detector.
#[derive(Debug)]
pub struct Watchdog {
    timeout: Duration,
    pet_tx: mpsc::Sender<()>,
    bark_rx: oneshot::Receiver<Bark>,
    barked: bool,
    task: JoinHandle<()>,
}

impl Watchdog {
    /// Starts a watchdog that barks after `timeout` without a pet.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(timeout: Duration) -> Self {
        // One slot: a pending pet absorbs any further pets until consumed.
        let (pet_tx, pet_rx) = mpsc::channel(1);
        let (bark_tx, bark_rx) = oneshot::channel();
        let task = tokio::spawn(watch(timeout, pet_rx, bark_tx));
        Watchdog {
            timeout,
            pet_tx,
            bark_rx,
            barked: false,
            task,
        }
    }

    /// Returns the timeout this watchdog was started with.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Signals that the owner is still alive. Never blocks.
    pub fn pet(&self) {
        let _ = self.pet_tx.try_send(());
    }

    /// Waits for the alarm.
    ///
    /// Cancel safe, so it can sit in a `tokio::select!` loop. Once the alarm
    /// has fired, every later call returns immediately.
    pub async fn barked(&mut self) -> Bark {
        if !self.barked {
            // The sender only goes away without sending if the task was
            // torn down with the runtime; nobody is watching then either.
            let _ = (&mut self.bark_rx).await;
            self.barked = true;
        }
        Bark
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn watch(timeout: Duration, mut pet_rx: mpsc::Receiver<()>, bark_tx: oneshot::Sender<Bark>) {
    loop {
        tokio::select! {
            pet = pet_rx.recv() => match pet {
                Some(()) => continue,
                None => return,
            },
            _ = tokio::time::sleep(timeout) => break,
        }
    }
    debug!(timeout_ms = timeout.as_millis() as u64, "watchdog timed out");
    let _ = bark_tx.send(Bark);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    const TIMEOUT: Duration = Duration::from_millis(100);

    #[tokio::test(start_paused = true)]
    async fn regular_pets_keep_it_quiet() {
        let mut dog = Watchdog::new(TIMEOUT);
        let start = Instant::now();

        while start.elapsed() < Duration::from_secs(1) {
            tokio::select! {
                _ = dog.barked() => panic!("barked while being petted"),
                _ = tokio::time::sleep(Duration::from_millis(50)) => dog.pet(),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn barks_after_pets_stop() {
        let mut dog = Watchdog::new(TIMEOUT);
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            dog.pet();
        }
        let last_pet = Instant::now();

        dog.barked().await;

        let silence = last_pet.elapsed();
        assert!(silence >= TIMEOUT, "barked early: {silence:?}");
        assert!(silence <= Duration::from_millis(150), "barked late: {silence:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn barks_without_any_pet() {
        let mut dog = Watchdog::new(TIMEOUT);
        let start = Instant::now();

        assert_eq!(dog.barked().await, Bark);
        assert!(start.elapsed() >= TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn pets_saturate_rather_than_accumulate() {
        let mut dog = Watchdog::new(TIMEOUT);
        // A burst of pets counts as one; it cannot buy extra time.
        for _ in 0..100 {
            dog.pet();
        }
        let start = Instant::now();

        dog.barked().await;

        assert!(start.elapsed() <= Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn bark_is_sticky() {
        let mut dog = Watchdog::new(TIMEOUT);
        dog.barked().await;

        // Petting a dead watchdog does nothing, and the alarm stays raised.
        dog.pet();
        let again = tokio::time::timeout(Duration::from_millis(1), dog.barked()).await;
        assert_eq!(again, Ok(Bark));
    }
}
