//! Daemon - the device service
//!
//! Wires the audio, GPIO, stream and store backends into the two
//! controllers, then runs them until interrupted. No ambient singletons:
//! every collaborator is constructed here and passed in explicitly.

use std::sync::Arc;

use tokio::sync::watch;

use crate::assistant::{ConversationClient, ConversationTransport, PushToTalkController};
use crate::audio::{AudioInput, AudioOutput, CpalInput, CpalOutput};
use crate::gpio::{DigitalOutput, SysfsButton, SysfsOutput};
use crate::prefs::Prefs;
use crate::relay::RelayController;
use crate::store::RestStore;
use crate::{Config, Result};

/// The Lantern daemon - push-to-talk assistant plus relay controller
pub struct Daemon {
    config: Config,
}

impl Daemon {
    /// Create a new daemon instance
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the daemon until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if a device or peripheral cannot be opened
    pub async fn run(self) -> Result<()> {
        let prefs = Prefs::open(&self.config.data_dir);
        let volume = prefs.volume_percentage();

        let output: Arc<dyn AudioOutput> = Arc::new(CpalOutput::new()?);
        #[allow(clippy::cast_precision_loss)]
        output.set_volume(volume as f32 / 100.0);
        tracing::info!(volume, "restored playback volume");

        let input: Arc<dyn AudioInput> = Arc::new(CpalInput::new()?);

        let led: Arc<dyn DigitalOutput> = Arc::new(SysfsOutput::open(self.config.gpio.led_pin)?);
        let relay: Arc<dyn DigitalOutput> =
            Arc::new(SysfsOutput::open(self.config.gpio.relay_pin)?);
        let (button, trigger_rx) = SysfsButton::watch(
            self.config.gpio.button_pin,
            self.config.gpio.button_active_low,
            self.config.gpio.debounce(),
        )?;

        let transport: Arc<dyn ConversationTransport> =
            Arc::new(ConversationClient::connect(&self.config.assistant.endpoint)?);

        // Ctrl-C flips the shutdown watch; both controllers drive their
        // outputs to safe defaults on the way out.
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
        });

        let controller =
            PushToTalkController::new(transport, input, output, led, prefs, volume);
        let ptt_task = tokio::spawn(controller.run(trigger_rx, shutdown_rx.clone()));

        let relay_task = if self.config.store.base_url.is_empty() {
            tracing::warn!("no event-store URL configured, relay controller disabled");
            None
        } else {
            let store = Arc::new(RestStore::new(&self.config.store));
            let events = store.subscribe();
            let relay_controller = RelayController::new(relay, store);
            Some(tokio::spawn(relay_controller.run(events, shutdown_rx)))
        };

        tracing::info!("lantern ready - hold the button to talk");

        if let Err(e) = ptt_task.await {
            tracing::error!(error = %e, "push-to-talk task failed");
        }
        if let Some(task) = relay_task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "relay task failed");
            }
        }

        drop(button);
        tracing::info!("shutdown complete");
        Ok(())
    }
}
