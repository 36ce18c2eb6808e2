/*!
 * Signal Subsystem
 * Owns the slot table, pending-event store, controller, and dispatcher
 *
 * One explicitly constructed value holds all shared state. Callers pass it
 * (usually as `Arc<SignalSubsystem>`) to every entry point instead of
 * reaching for process globals.
 */

use super::atomic_stats::AtomicDeliveryStats;
use super::callbacks::ListenerRegistry;
use super::controller::DispositionController;
use super::delivery::{DeliveryThreadManager, ThreadLifecycle};
use super::dispatcher::Dispatcher;
use super::disposition::Disposition;
use super::pending::PendingEvents;
use super::slots::SlotTable;
use super::traits::{DeliveryObserver, SignalConsumer, SignalControl};
use super::types::{
    DeliveryStats, SignalMask, SignalResult, SlotId, SlotSnapshot, SlotState,
};
use crate::config::SignalConfig;
use log::{debug, info, warn};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`SignalSubsystem`]
#[derive(Default)]
pub struct SignalSubsystemBuilder {
    config: Option<SignalConfig>,
    observer: Option<Arc<dyn DeliveryObserver>>,
}

impl SignalSubsystemBuilder {
    pub fn with_config(mut self, config: SignalConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn DeliveryObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> SignalResult<SignalSubsystem> {
        let config = self.config.unwrap_or_default();
        let table = Arc::new(SlotTable::from_config(&config)?);
        let events = Arc::new(PendingEvents::new());
        let stats = Arc::new(AtomicDeliveryStats::new());

        let mut delivery = DeliveryThreadManager::new(events.clone(), stats.clone());
        if let Some(observer) = self.observer {
            delivery = delivery.with_observer(observer);
        }

        info!("Signal subsystem initialized with {} slots", table.len());
        Ok(SignalSubsystem {
            controller: DispositionController::new(table.clone(), delivery),
            table,
            events,
            stats,
            listeners: Arc::new(ListenerRegistry::new()),
            dispatcher: Dispatcher::new(),
            shut_down: AtomicBool::new(false),
        })
    }
}

/// Poll-style signal multiplexer
pub struct SignalSubsystem {
    table: Arc<SlotTable>,
    events: Arc<PendingEvents>,
    stats: Arc<AtomicDeliveryStats>,
    controller: DispositionController,
    listeners: Arc<ListenerRegistry>,
    dispatcher: Dispatcher,
    shut_down: AtomicBool,
}

impl SignalSubsystem {
    pub fn builder() -> SignalSubsystemBuilder {
        SignalSubsystemBuilder::default()
    }

    /// Subsystem over the given catalogue
    pub fn new(config: SignalConfig) -> SignalResult<Self> {
        Self::builder().with_config(config).build()
    }

    /// Subsystem over the standard catalogue
    pub fn standard() -> SignalResult<Self> {
        Self::builder().build()
    }

    pub fn table(&self) -> &SlotTable {
        &self.table
    }

    /// Validate a raw slot identifier against this catalogue
    pub fn slot(&self, raw: i64) -> SignalResult<SlotId> {
        self.table.slot(raw)
    }

    pub fn states(&self) -> Vec<SlotState> {
        self.controller.states()
    }

    pub fn saved_disposition(&self, slot: SlotId) -> SignalResult<Option<Disposition>> {
        self.controller.saved_disposition(slot)
    }

    pub fn delivery_mask(&self) -> SignalMask {
        self.controller.delivery_mask()
    }

    pub fn lifecycle(&self) -> ThreadLifecycle {
        self.controller.lifecycle().get()
    }

    /// Occurrences of `slot`'s signal not yet consumed
    pub fn pending(&self, slot: SlotId) -> SignalResult<u32> {
        Ok(self.events.pending_for(self.table.signal_of(slot)?))
    }

    /// Consume a pending event without blocking
    pub fn try_wait_for_signal(&self) -> SignalResult<Option<SlotId>> {
        let slot = self.events.try_take(&self.table)?;
        if slot.is_some() {
            self.stats.inc_consumed();
        }
        Ok(slot)
    }

    /// Send `slot`'s signal to `pid`
    pub fn send_slot(&self, pid: Pid, slot: SlotId) -> SignalResult<()> {
        let signal = self.table.signal_of(slot)?;
        self.send(pid, signal)
    }

    /// Register a listener on `slot`, starting the dispatcher if needed
    ///
    /// Once the dispatcher runs it consumes every pending event, so mixing
    /// listeners with direct `wait_for_signal` callers splits events
    /// between them.
    pub fn add_listener<F>(&self, slot: SlotId, listener: F) -> SignalResult<u64>
    where
        F: Fn(SlotId, Signal) + Send + Sync + 'static,
    {
        self.table.signal_of(slot)?;
        let id = self.listeners.register(slot, listener);
        self.dispatcher.ensure_started(
            self.table.clone(),
            self.events.clone(),
            self.listeners.clone(),
            self.stats.clone(),
        )?;
        Ok(id)
    }

    pub fn remove_listener(&self, listener_id: u64) -> bool {
        self.listeners.unregister(listener_id)
    }

    /// True while the listener dispatch thread is alive
    pub fn is_dispatching(&self) -> bool {
        self.dispatcher.is_running()
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Per-slot view
    pub fn snapshot(&self) -> Vec<SlotSnapshot> {
        let states = self.controller.states();
        self.table
            .iter()
            .map(|(slot, signal)| SlotSnapshot {
                slot,
                signal: signal.as_str().to_string(),
                signal_number: signal as i32,
                state: states[slot.index()],
                pending: self.events.pending_for(signal),
            })
            .collect()
    }

    pub fn stats(&self) -> DeliveryStats {
        self.stats.snapshot()
    }

    /// Restore every slot, stop the delivery thread, and release waiters
    ///
    /// Blocked `wait_for_signal` calls drain what is still pending, then
    /// fail with `Closed`. Safe to call more than once.
    pub fn shutdown(&self) -> SignalResult<()> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let restored = self.controller.restore_all();
        self.events.close();
        self.dispatcher.join();

        info!("Signal subsystem shut down");
        restored
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn controller(&self) -> &DispositionController {
        &self.controller
    }

    #[cfg(test)]
    pub(crate) fn events(&self) -> &PendingEvents {
        &self.events
    }
}

impl SignalControl for SignalSubsystem {
    fn set_state(&self, slot: SlotId, state: SlotState) -> SignalResult<()> {
        self.controller.set_state(slot, state)
    }

    fn state_of(&self, slot: SlotId) -> SignalResult<SlotState> {
        self.controller.state_of(slot)
    }
}

impl SignalConsumer for SignalSubsystem {
    fn wait_for_signal(&self) -> SignalResult<SlotId> {
        let slot = self.events.take(&self.table)?;
        self.stats.inc_consumed();
        debug!("Consumed event on slot {}", slot);
        Ok(slot)
    }

    fn wait_for_signal_timeout(&self, timeout: Duration) -> SignalResult<Option<SlotId>> {
        let slot = self.events.take_timeout(&self.table, timeout)?;
        if slot.is_some() {
            self.stats.inc_consumed();
        }
        Ok(slot)
    }

    fn signal_number_of(&self, slot: SlotId) -> SignalResult<Signal> {
        self.table.signal_of(slot)
    }

    fn send(&self, pid: Pid, signal: Signal) -> SignalResult<()> {
        kill(pid, signal)?;
        debug!("Sent {} to PID {}", signal, pid);
        Ok(())
    }
}

impl Drop for SignalSubsystem {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Signal subsystem shutdown incomplete: {}", e);
        }
    }
}
