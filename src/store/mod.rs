//! Remote event store
//!
//! The relay controller consumes a single typed feed merging the
//! default-interval value reference and the activation collection, and
//! retires completed records through [`ActivationStore`]. Payloads are
//! schema-validated here at the boundary; nothing downstream touches raw
//! JSON.

pub mod rest;

use async_trait::async_trait;
use serde::Deserialize;

use crate::Result;

pub use rest::RestStore;

/// A relay activation record
///
/// Extra fields in the stored record are tolerated; a present `interval`
/// must be an unsigned integer or the record is rejected at parse time.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ActivationRecord {
    /// Relay hold duration in milliseconds; the cached default applies when
    /// absent
    #[serde(default)]
    pub interval: Option<u64>,
}

/// One notification from the store's change feeds, in arrival order
#[derive(Debug)]
pub enum StoreEvent {
    /// The shared default release interval changed (milliseconds)
    DefaultInterval(u64),

    /// A new activation record appeared
    Added {
        /// Store-assigned record key
        key: String,
        /// Validated record payload
        record: ActivationRecord,
    },

    /// An existing record changed; accepted but produces no action
    Changed {
        /// Store-assigned record key
        key: String,
    },

    /// A record was removed; accepted but produces no action
    Removed {
        /// Store-assigned record key
        key: String,
    },

    /// A record moved; accepted but produces no action
    Moved {
        /// Store-assigned record key
        key: String,
    },

    /// A subscription was cancelled by the backend
    Cancelled {
        /// Backend-supplied reason
        reason: String,
    },
}

/// Store mutations the relay controller performs
#[async_trait]
pub trait ActivationStore: Send + Sync {
    /// Delete an activation record as the completion acknowledgment
    ///
    /// # Errors
    ///
    /// Returns error on transport failure; callers log and continue
    async fn remove(&self, key: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_with_interval_parses() {
        let record: ActivationRecord =
            serde_json::from_str(r#"{"interval": 500, "requested_by": "app"}"#).unwrap();
        assert_eq!(record.interval, Some(500));
    }

    #[test]
    fn record_without_interval_parses() {
        let record: ActivationRecord = serde_json::from_str("{}").unwrap();
        assert_eq!(record.interval, None);
    }

    #[test]
    fn record_with_wrong_interval_type_is_rejected() {
        let result = serde_json::from_str::<ActivationRecord>(r#"{"interval": "soon"}"#);
        assert!(result.is_err());
    }
}
