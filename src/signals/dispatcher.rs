/*!
 * Listener Dispatcher
 * Background consumer that turns pending events into listener calls
 */

use super::atomic_stats::AtomicDeliveryStats;
use super::callbacks::ListenerRegistry;
use super::limits::DISPATCH_THREAD_NAME;
use super::pending::PendingEvents;
use super::slots::SlotTable;
use super::types::{SignalError, SignalResult};
use log::{debug, error, info};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Owns the dispatch thread
///
/// The thread drains the pending-event store like any other consumer and
/// exits once the store is closed.
pub struct Dispatcher {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handle: Mutex::new(None),
        }
    }

    /// Start the dispatch thread unless it is already running
    pub fn ensure_started(
        &self,
        table: Arc<SlotTable>,
        events: Arc<PendingEvents>,
        listeners: Arc<ListenerRegistry>,
        stats: Arc<AtomicDeliveryStats>,
    ) -> SignalResult<()> {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return Ok(());
        }

        let spawned = thread::Builder::new()
            .name(DISPATCH_THREAD_NAME.to_string())
            .spawn(move || dispatch_loop(&table, &events, &listeners, &stats))
            .map_err(|e| SignalError::DeliveryThread(e.to_string()))?;

        *handle = Some(spawned);
        info!("Listener dispatcher started");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Join the thread; the caller must have closed the store first
    pub fn join(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Listener dispatcher panicked");
            }
            debug!("Listener dispatcher joined");
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn dispatch_loop(
    table: &SlotTable,
    events: &PendingEvents,
    listeners: &ListenerRegistry,
    stats: &AtomicDeliveryStats,
) {
    loop {
        let slot = match events.take(table) {
            Ok(slot) => slot,
            Err(SignalError::Closed) => break,
            Err(e) => {
                error!("Dispatcher wait failed: {}", e);
                break;
            }
        };
        stats.inc_consumed();

        match table.signal_of(slot) {
            Ok(signal) => {
                listeners.dispatch(slot, signal);
            }
            Err(e) => error!("Dispatcher got unknown slot {}: {}", slot, e),
        }
    }
    debug!("Listener dispatcher exiting");
}
