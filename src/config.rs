//! Configuration types for HiveDir.
//!
//! The [`HiveConfig`] struct bootstraps a hive instance: the URI of the hive
//! metadata database, the sync daemon period, and whether performance
//! counters are recorded.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use hivedir::HiveConfig;
//!
//! // Defaults: 1 s sync period, monitoring off
//! let config = HiveConfig::new("./hive.db");
//!
//! // Customize with struct update syntax
//! let config = HiveConfig {
//!     sync_period: Duration::from_millis(250),
//!     performance_monitoring: true,
//!     ..HiveConfig::new("./hive.db")
//! };
//! ```

use std::time::Duration;

use crate::error::ValidationError;

/// Default period of the background sync daemon.
pub const DEFAULT_SYNC_PERIOD: Duration = Duration::from_secs(1);

/// Hive bootstrap configuration.
///
/// The URI addresses the hive metadata database. For the embedded storage
/// engine a URI is a filesystem path, optionally prefixed with `file:`.
/// Dimension directory databases default to the same URI unless a dimension
/// declares its own `index_uri`.
#[derive(Clone, Debug)]
pub struct HiveConfig {
    /// URI of the hive metadata database.
    pub uri: String,

    /// Period of the background sync daemon.
    ///
    /// [`Duration::ZERO`] disables the daemon; [`crate::Hive::force_synchronize`]
    /// remains available for manual reconciliation.
    pub sync_period: Duration,

    /// Whether connection and directory counters are recorded.
    ///
    /// When disabled, [`crate::Hive::statistics`] reports zeros.
    pub performance_monitoring: bool,
}

impl HiveConfig {
    /// Creates a configuration for the hive at `uri` with default settings.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            sync_period: DEFAULT_SYNC_PERIOD,
            performance_monitoring: false,
        }
    }

    /// Validates the configuration.
    ///
    /// Called automatically by [`crate::Hive::load`] and
    /// [`crate::Hive::create`]. You can also call this explicitly to check
    /// configuration up front.
    ///
    /// # Errors
    /// Returns `ValidationError` if the URI is empty or whitespace-only.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.uri.trim().is_empty() {
            return Err(ValidationError::required_field("uri"));
        }
        Ok(())
    }
}
