//! Background revision synchronization.
//!
//! Every hive instance caches the metadata graph in memory. Cooperating
//! instances (other threads, other processes sharing the hive database)
//! detect each other's metadata mutations through the persisted
//! [`HiveSemaphore`](crate::meta::HiveSemaphore) revision: when the
//! persisted revision differs from the cached one, the whole graph is
//! reloaded and swapped atomically.
//!
//! The [`SyncDaemon`] drives this comparison on a timer. It is
//! single-threaded per hive instance, holds only a weak reference (so a
//! dropped hive stops its daemon), logs failed ticks at `warn` level, and
//! retries on the next tick.

use std::sync::Weak;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender};
use tracing::{debug, warn};

use crate::error::Result;
use crate::hive::HiveCore;

/// Handle to the background sync thread of one hive instance.
///
/// Dropping the handle signals the thread and joins it.
pub(crate) struct SyncDaemon {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl SyncDaemon {
    /// Spawns the sync thread, ticking every `period`.
    pub(crate) fn spawn(core: Weak<HiveCore>, period: Duration) -> Result<Self> {
        let (stop, stop_rx) = bounded::<()>(1);
        let ticker = tick(period);

        let handle = std::thread::Builder::new()
            .name("hivedir-sync".to_string())
            .spawn(move || loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(ticker) -> _ => {
                        let Some(core) = core.upgrade() else { break };
                        match core.force_synchronize() {
                            Ok(true) => debug!("Sync tick reloaded metadata"),
                            Ok(false) => {}
                            Err(e) => warn!(error = %e, "Sync tick failed, retrying on next tick"),
                        }
                    }
                }
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for SyncDaemon {
    fn drop(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
