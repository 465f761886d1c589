//! Sysfs GPIO backend
//!
//! Pin access through `/sys/class/gpio`; good enough for single-board
//! computers without a character-device userspace.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use super::{DigitalOutput, TriggerEvent};
use crate::{Error, Result};

/// Sysfs GPIO root
const GPIO_ROOT: &str = "/sys/class/gpio";

/// Poll interval for the button watcher thread
const BUTTON_POLL: Duration = Duration::from_millis(5);

/// An exported sysfs output pin, driven low on open
pub struct SysfsOutput {
    pin: u32,
    value_path: PathBuf,
}

impl SysfsOutput {
    /// Export the pin, set it as an output and drive it low
    ///
    /// # Errors
    ///
    /// Returns [`Error::Gpio`] if the pin cannot be exported or configured
    pub fn open(pin: u32) -> Result<Self> {
        export(pin)?;
        write_pin_file(pin, "direction", "out")?;

        let output = Self {
            pin,
            value_path: pin_path(pin, "value"),
        };
        output.set(false)?;

        tracing::debug!(pin, "sysfs output opened");
        Ok(output)
    }
}

impl DigitalOutput for SysfsOutput {
    fn set(&self, value: bool) -> Result<()> {
        std::fs::write(&self.value_path, if value { "1" } else { "0" })
            .map_err(|e| Error::Gpio(format!("pin {}: {e}", self.pin)))
    }
}

/// Debounced button watcher on a sysfs input pin
///
/// A polling thread reads the pin level and reports clean press/release
/// transitions; rapid bounces shorter than the debounce interval are
/// suppressed. Dropping the watcher stops the thread.
pub struct SysfsButton {
    stop: Arc<AtomicBool>,
}

impl SysfsButton {
    /// Export the pin as an input and start watching it
    ///
    /// With `active_low`, a low level counts as pressed (pull-up wiring).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Gpio`] if the pin cannot be exported or configured
    pub fn watch(
        pin: u32,
        active_low: bool,
        debounce: Duration,
    ) -> Result<(Self, mpsc::Receiver<TriggerEvent>)> {
        export(pin)?;
        write_pin_file(pin, "direction", "in")?;

        let (tx, rx) = mpsc::channel(16);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let value_path = pin_path(pin, "value");

        std::thread::Builder::new()
            .name("button-watch".to_string())
            .spawn(move || {
                watch_thread(pin, &value_path, active_low, debounce, &tx, &thread_stop);
            })
            .map_err(|e| Error::Gpio(format!("failed to spawn button thread: {e}")))?;

        tracing::debug!(pin, active_low, ?debounce, "button watcher started");
        Ok((Self { stop }, rx))
    }
}

impl Drop for SysfsButton {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Poll the pin and emit debounced transitions
fn watch_thread(
    pin: u32,
    value_path: &Path,
    active_low: bool,
    debounce: Duration,
    tx: &mpsc::Sender<TriggerEvent>,
    stop: &AtomicBool,
) {
    let mut stable = false;
    let mut candidate = false;
    let mut candidate_since = Instant::now();

    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(BUTTON_POLL);

        let raw = match std::fs::read_to_string(value_path) {
            Ok(contents) => contents.trim() == "1",
            Err(e) => {
                tracing::warn!(pin, error = %e, "error reading button level");
                continue;
            }
        };
        let pressed = raw != active_low;

        if pressed != candidate {
            candidate = pressed;
            candidate_since = Instant::now();
            continue;
        }

        if candidate != stable && candidate_since.elapsed() >= debounce {
            stable = candidate;
            let event = if stable {
                TriggerEvent::Pressed
            } else {
                TriggerEvent::Released
            };
            if tx.blocking_send(event).is_err() {
                return;
            }
        }
    }
}

fn pin_path(pin: u32, file: &str) -> PathBuf {
    PathBuf::from(format!("{GPIO_ROOT}/gpio{pin}/{file}"))
}

/// Export the pin; a no-op when it is already exported
fn export(pin: u32) -> Result<()> {
    if PathBuf::from(format!("{GPIO_ROOT}/gpio{pin}")).exists() {
        return Ok(());
    }

    std::fs::write(format!("{GPIO_ROOT}/export"), pin.to_string())
        .map_err(|e| Error::Gpio(format!("failed to export pin {pin}: {e}")))
}

fn write_pin_file(pin: u32, file: &str, value: &str) -> Result<()> {
    std::fs::write(pin_path(pin, file), value)
        .map_err(|e| Error::Gpio(format!("pin {pin} {file}: {e}")))
}
