//! Performance counters for connection and directory traffic.
//!
//! The hive records how many read/write connections it hands out, how many
//! connection attempts fail, and how many directory rows it reads and
//! writes. Recording is gated by
//! [`HiveConfig::performance_monitoring`](crate::HiveConfig); when disabled
//! every counter stays at zero and recording is a no-op.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters shared by the hive facade and its directories.
#[derive(Debug, Default)]
pub struct HiveStatistics {
    enabled: bool,
    new_read_connections: AtomicU64,
    new_write_connections: AtomicU64,
    connection_failures: AtomicU64,
    directory_reads: AtomicU64,
    directory_writes: AtomicU64,
}

impl HiveStatistics {
    /// Creates a counter set; disabled counters never record.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    /// Returns true if recording is enabled.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn record_read_connection(&self) {
        if self.enabled {
            self.new_read_connections.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_write_connection(&self) {
        if self.enabled {
            self.new_write_connections.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_connection_failure(&self) {
        if self.enabled {
            self.connection_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_directory_read(&self) {
        if self.enabled {
            self.directory_reads.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_directory_write(&self) {
        if self.enabled {
            self.directory_writes.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns a point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            new_read_connections: self.new_read_connections.load(Ordering::Relaxed),
            new_write_connections: self.new_write_connections.load(Ordering::Relaxed),
            connection_failures: self.connection_failures.load(Ordering::Relaxed),
            directory_reads: self.directory_reads.load(Ordering::Relaxed),
            directory_writes: self.directory_writes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the hive counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    /// Read connections handed out.
    pub new_read_connections: u64,
    /// Read-write connections handed out.
    pub new_write_connections: u64,
    /// Connection attempts that failed (lock refusal or source error).
    pub connection_failures: u64,
    /// Directory lookup operations served.
    pub directory_reads: u64,
    /// Directory mutation operations served.
    pub directory_writes: u64,
}
