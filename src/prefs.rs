//! Persisted device preferences
//!
//! One TOML file under the data directory. Today it holds a single scalar:
//! the playback volume, written whenever the assistant changes it and read
//! back at the next start.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default volume percentage (device maximum)
pub const DEFAULT_VOLUME: u32 = 100;

/// On-disk preference schema
#[derive(Debug, Default, Serialize, Deserialize)]
struct PrefsFile {
    /// Current playback volume percentage, 0-100
    volume_percentage: Option<u32>,
}

/// TOML-backed preference store surviving restarts
#[derive(Debug, Clone)]
pub struct Prefs {
    path: PathBuf,
}

impl Prefs {
    /// Bind the preference file under the given data directory
    #[must_use]
    pub fn open(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("prefs.toml"),
        }
    }

    /// Read the persisted volume percentage, defaulting to device maximum
    #[must_use]
    pub fn volume_percentage(&self) -> u32 {
        self.read()
            .volume_percentage
            .unwrap_or(DEFAULT_VOLUME)
            .min(100)
    }

    /// Persist a new volume percentage
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn set_volume_percentage(&self, volume: u32) -> Result<()> {
        let mut file = self.read();
        file.volume_percentage = Some(volume.min(100));

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents =
            toml::to_string_pretty(&file).map_err(|e| Error::Prefs(e.to_string()))?;
        std::fs::write(&self.path, contents)?;

        tracing::debug!(volume, path = %self.path.display(), "volume preference saved");
        Ok(())
    }

    /// Load the file, falling back to defaults when missing or malformed
    fn read(&self) -> PrefsFile {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to parse preferences, using defaults"
                );
                PrefsFile::default()
            }),
            Err(_) => PrefsFile::default(),
        }
    }
}
