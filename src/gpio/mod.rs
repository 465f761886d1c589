//! GPIO peripherals: digital outputs and the push-to-talk trigger
//!
//! The controllers only see [`DigitalOutput`] and [`TriggerEvent`]; the sysfs
//! backend is the on-device implementation. Output failures are logged by
//! callers and never treated as fatal.

pub mod sysfs;

use crate::Result;

pub use sysfs::{SysfsButton, SysfsOutput};

/// A boolean-settable digital output (LED, relay line)
pub trait DigitalOutput: Send + Sync {
    /// Drive the output high (`true`) or low (`false`)
    ///
    /// # Errors
    ///
    /// Returns error on I/O failure; callers log and continue
    fn set(&self, value: bool) -> Result<()>;
}

/// Debounced press/release transition from the physical trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    /// Trigger went down
    Pressed,
    /// Trigger came back up
    Released,
}
