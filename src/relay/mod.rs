//! Relay activation controller
//!
//! Reacts to the remote store's merged change feed: value updates replace
//! the cached default release interval, new activation records energize the
//! relay for their resolved duration, and completion deletes the record as
//! the acknowledgment. One task owns the relay and the single armed
//! countdown, so supersede-and-rearm is atomic with respect to concurrent
//! activations.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::gpio::DigitalOutput;
use crate::store::{ActivationRecord, ActivationStore, StoreEvent};

/// The single armed countdown; at most one exists system-wide
struct Armed {
    key: String,
    deadline: Instant,
}

/// Drives the shared relay output from remote activation records
pub struct RelayController {
    relay: Arc<dyn DigitalOutput>,
    store: Arc<dyn ActivationStore>,
    default_interval: Duration,
    armed: Option<Armed>,
}

impl RelayController {
    /// Create a controller; the default interval starts at zero until the
    /// value feed first fires
    #[must_use]
    pub fn new(relay: Arc<dyn DigitalOutput>, store: Arc<dyn ActivationStore>) -> Self {
        Self {
            relay,
            store,
            default_interval: Duration::ZERO,
            armed: None,
        }
    }

    /// Run until shutdown fires or the feed closes
    ///
    /// The relay is forced low on the way out regardless of timer state.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<StoreEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let deadline = self.armed.as_ref().map(|armed| armed.deadline);

            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                () = sleep_until_deadline(deadline), if deadline.is_some() => {
                    if let Some(armed) = self.armed.take() {
                        self.complete(armed).await;
                    }
                }
            }
        }

        // Safety default: never leave the relay energized on teardown.
        if let Err(e) = self.relay.set(false) {
            tracing::warn!(error = %e, "error forcing relay low on shutdown");
        }
        tracing::info!("relay controller stopped");
    }

    /// Apply one feed notification
    fn handle_event(&mut self, event: StoreEvent) {
        match event {
            StoreEvent::DefaultInterval(millis) => {
                self.default_interval = Duration::from_millis(millis);
                tracing::info!(millis, "default release interval updated");
            }
            StoreEvent::Added { key, record } => self.activate(key, &record),
            StoreEvent::Changed { key }
            | StoreEvent::Removed { key }
            | StoreEvent::Moved { key } => {
                // Inert: a running countdown is not affected by later edits
                // to its record or to other records.
                tracing::trace!(key, "ignoring child event");
            }
            StoreEvent::Cancelled { reason } => {
                tracing::warn!(reason, "store subscription cancelled");
            }
        }
    }

    /// Supersede any armed countdown and energize the relay for this record
    fn activate(&mut self, key: String, record: &ActivationRecord) {
        let interval = record
            .interval
            .map_or(self.default_interval, Duration::from_millis);

        if let Some(previous) = self.armed.take() {
            tracing::debug!(superseded = %previous.key, "cancelling in-flight activation timer");
        }

        if let Err(e) = self.relay.set(true) {
            tracing::error!(error = %e, "error asserting relay");
        }

        tracing::info!(key = %key, ?interval, "relay activated");
        self.armed = Some(Armed {
            key,
            deadline: Instant::now() + interval,
        });
    }

    /// Countdown expiry: release the relay and retire the record
    async fn complete(&mut self, armed: Armed) {
        if let Err(e) = self.relay.set(false) {
            tracing::error!(error = %e, "error releasing relay");
        }

        if let Err(e) = self.store.remove(&armed.key).await {
            tracing::error!(key = %armed.key, error = %e, "failed to delete activation record");
        }

        tracing::info!(key = %armed.key, "relay released");
    }
}

/// Sleep until the armed deadline; pends forever when nothing is armed
async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::Result;

    struct MockPin {
        levels: Arc<Mutex<Vec<bool>>>,
    }

    impl DigitalOutput for MockPin {
        fn set(&self, value: bool) -> Result<()> {
            self.levels.lock().unwrap().push(value);
            Ok(())
        }
    }

    struct MockStore {
        removed: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ActivationStore for MockStore {
        async fn remove(&self, key: &str) -> Result<()> {
            self.removed.lock().unwrap().push(key.to_string());
            Ok(())
        }
    }

    #[allow(clippy::type_complexity)]
    fn harness() -> (
        RelayController,
        Arc<Mutex<Vec<bool>>>,
        Arc<Mutex<Vec<String>>>,
    ) {
        let levels = Arc::new(Mutex::new(Vec::new()));
        let removed = Arc::new(Mutex::new(Vec::new()));
        let controller = RelayController::new(
            Arc::new(MockPin {
                levels: Arc::clone(&levels),
            }),
            Arc::new(MockStore {
                removed: Arc::clone(&removed),
            }),
        );
        (controller, levels, removed)
    }

    #[tokio::test(start_paused = true)]
    async fn record_interval_governs_release() {
        let (controller, levels, removed) = harness();
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(controller.run(rx, shutdown_rx));

        tx.send(StoreEvent::Added {
            key: "a".to_string(),
            record: ActivationRecord {
                interval: Some(300),
            },
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(290)).await;
        assert_eq!(levels.lock().unwrap().last(), Some(&true));
        assert!(removed.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(levels.lock().unwrap().last(), Some(&false));
        assert_eq!(removed.lock().unwrap().as_slice(), ["a"]);

        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn removed_record_does_not_cancel_countdown() {
        let (controller, levels, removed) = harness();
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(controller.run(rx, shutdown_rx));

        tx.send(StoreEvent::Added {
            key: "a".to_string(),
            record: ActivationRecord {
                interval: Some(400),
            },
        })
        .await
        .unwrap();
        tx.send(StoreEvent::Removed {
            key: "a".to_string(),
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(levels.lock().unwrap().last(), Some(&true));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(levels.lock().unwrap().last(), Some(&false));
        assert_eq!(removed.lock().unwrap().as_slice(), ["a"]);

        drop(tx);
        task.await.unwrap();
    }
}
