/*!
 * Delivery Thread Manager
 * Owns the single background thread parked in sigwait on the trapped set
 *
 * A thread blocked in sigwait cannot have its wait set changed, so every
 * change of the trapped set stops the current thread, joins it, and starts
 * a replacement on the new mask.
 *
 * Stopping sets the thread's stop flag and sends it one of its own masked
 * signals with pthread_kill. The thread re-checks the flag under the
 * pending-event lock before recording, so an occurrence it captured after
 * the stop request is dropped. Captured-but-unrecorded events are lost
 * across a restart; `events_dropped` counts them.
 */

use super::atomic_stats::AtomicDeliveryStats;
use super::pending::PendingEvents;
use super::slots::SlotTable;
use super::traits::DeliveryObserver;
use super::types::{SignalError, SignalMask, SignalResult, SlotState};
use super::limits::DELIVERY_THREAD_NAME;
use log::{debug, error, info, warn};
use nix::errno::Errno;
use nix::sys::pthread::pthread_kill;
use nix::sys::signal::{SigmaskHow, Signal};
use std::os::unix::thread::JoinHandleExt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Delivery thread lifecycle
///
/// `Stopped -> Starting -> Running -> Stopping -> Stopped`. A start is never
/// issued from `Stopping`; the join completes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadLifecycle {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl ThreadLifecycle {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ThreadLifecycle::Starting,
            2 => ThreadLifecycle::Running,
            3 => ThreadLifecycle::Stopping,
            _ => ThreadLifecycle::Stopped,
        }
    }
}

/// Lifecycle readable without the controller lock
#[derive(Debug, Default)]
pub struct LifecycleCell(AtomicU8);

impl LifecycleCell {
    pub fn get(&self) -> ThreadLifecycle {
        ThreadLifecycle::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: ThreadLifecycle) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

struct DeliveryThread {
    handle: JoinHandle<()>,
    mask: SignalMask,
    stop: Arc<AtomicBool>,
}

/// Starts, stops, and restarts the delivery thread
///
/// Lives inside the disposition controller's lock, which is what keeps
/// resyncs serialized and the thread count at zero or one.
pub struct DeliveryThreadManager {
    current: Option<DeliveryThread>,
    lifecycle: Arc<LifecycleCell>,
    events: Arc<PendingEvents>,
    stats: Arc<AtomicDeliveryStats>,
    observer: Option<Arc<dyn DeliveryObserver>>,
}

impl DeliveryThreadManager {
    pub fn new(events: Arc<PendingEvents>, stats: Arc<AtomicDeliveryStats>) -> Self {
        Self {
            current: None,
            lifecycle: Arc::new(LifecycleCell::default()),
            events,
            stats,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn DeliveryObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Shared handle on the lifecycle state
    pub fn lifecycle(&self) -> Arc<LifecycleCell> {
        self.lifecycle.clone()
    }

    /// Mask the running thread waits on; empty when none runs
    pub fn current_mask(&self) -> SignalMask {
        self.current
            .as_ref()
            .map(|t| t.mask)
            .unwrap_or(SignalMask::EMPTY)
    }

    /// Bring the thread in line with the trapped slots
    ///
    /// Returns true when the thread was stopped, started, or replaced.
    pub fn resync(&mut self, table: &SlotTable, states: &[SlotState]) -> SignalResult<bool> {
        self.stats.inc_resyncs();

        let wanted: SignalMask = table
            .iter()
            .filter(|(slot, _)| states[slot.index()] == SlotState::Trapped)
            .map(|(_, signal)| signal)
            .collect();

        let current = self.current_mask();
        if wanted == current {
            debug!("Delivery mask unchanged at {}", current);
            return Ok(false);
        }

        debug!("Delivery mask changing from {} to {}", current, wanted);

        if let Some(thread) = self.current.take() {
            self.stop_thread(thread);
            if !wanted.is_empty() {
                self.stats.inc_restarts();
            }
        }

        if !wanted.is_empty() {
            self.start_thread(wanted)?;
        }

        Ok(true)
    }

    /// Stop the thread if one is running
    pub fn stop(&mut self) {
        if let Some(thread) = self.current.take() {
            self.stop_thread(thread);
        }
    }

    fn start_thread(&mut self, mask: SignalMask) -> SignalResult<()> {
        self.lifecycle.set(ThreadLifecycle::Starting);

        // Block the mask here so the new thread inherits it from birth.
        let set = mask.to_sigset();
        let previous = match set.thread_swap_mask(SigmaskHow::SIG_BLOCK) {
            Ok(previous) => previous,
            Err(e) => {
                self.lifecycle.set(ThreadLifecycle::Stopped);
                return Err(e.into());
            }
        };

        let stop = Arc::new(AtomicBool::new(false));
        let spawned = {
            let stop = stop.clone();
            let events = self.events.clone();
            let stats = self.stats.clone();
            thread::Builder::new()
                .name(DELIVERY_THREAD_NAME.to_string())
                .spawn(move || delivery_loop(mask, stop, events, stats))
        };

        if let Err(e) = previous.thread_set_mask() {
            warn!("Failed to restore caller signal mask: {}", e);
        }

        let handle = spawned.map_err(|e| {
            self.lifecycle.set(ThreadLifecycle::Stopped);
            error!("Failed to spawn delivery thread for {}: {}", mask, e);
            SignalError::DeliveryThread(e.to_string())
        })?;

        self.stats.inc_threads_started();
        if let Some(observer) = &self.observer {
            observer.thread_started(mask);
        }

        self.current = Some(DeliveryThread { handle, mask, stop });
        self.lifecycle.set(ThreadLifecycle::Running);
        info!("Delivery thread started on {}", mask);
        Ok(())
    }

    fn stop_thread(&mut self, thread: DeliveryThread) {
        self.lifecycle.set(ThreadLifecycle::Stopping);
        thread.stop.store(true, Ordering::SeqCst);

        if let Some(wake) = thread.mask.first() {
            match pthread_kill(thread.handle.as_pthread_t(), wake) {
                Ok(()) | Err(Errno::ESRCH) => {}
                // Joining a thread we could not wake would hang forever and
                // leave an unknown number of waiters parked on signals.
                Err(e) => panic!("cannot wake delivery thread on {}: {}", thread.mask, e),
            }
        }

        if thread.handle.join().is_err() {
            error!("Delivery thread on {} panicked", thread.mask);
        }

        self.stats.inc_threads_joined();
        if let Some(observer) = &self.observer {
            observer.thread_joined(thread.mask);
        }

        self.lifecycle.set(ThreadLifecycle::Stopped);
        info!("Delivery thread on {} stopped", thread.mask);
    }

    /// Send `signal` straight to the delivery thread
    #[cfg(test)]
    pub(crate) fn signal_thread(&self, signal: Signal) -> SignalResult<()> {
        let thread = self
            .current
            .as_ref()
            .ok_or_else(|| SignalError::DeliveryThread("no delivery thread".to_string()))?;
        pthread_kill(thread.handle.as_pthread_t(), signal)?;
        Ok(())
    }
}

impl Drop for DeliveryThreadManager {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Delivery thread body
///
/// The only exits are the stop flag and an unrecoverable sigwait error.
/// Between sigwait and the record there is no exit point, so shared state
/// is never left half-updated.
fn delivery_loop(
    mask: SignalMask,
    stop: Arc<AtomicBool>,
    events: Arc<PendingEvents>,
    stats: Arc<AtomicDeliveryStats>,
) {
    let set = mask.to_sigset();
    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }

        let signal: Signal = match set.wait() {
            Ok(signal) => signal,
            Err(e) => {
                error!("sigwait on {} failed: {}", mask, e);
                break;
            }
        };
        if stop.load(Ordering::SeqCst) {
            // the wake-up itself, or a signal indistinguishable from it
            break;
        }
        stats.inc_captured();

        if events.record_if(signal, || !stop.load(Ordering::SeqCst)) {
            stats.inc_recorded();
        } else {
            stats.inc_dropped();
            debug!("Dropped {} captured during restart", signal);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::types::SlotId;
    use pretty_assertions::assert_eq;
    use std::time::{Duration, Instant};

    fn manager() -> (DeliveryThreadManager, Arc<PendingEvents>, Arc<AtomicDeliveryStats>) {
        let events = Arc::new(PendingEvents::new());
        let stats = Arc::new(AtomicDeliveryStats::new());
        (DeliveryThreadManager::new(events.clone(), stats.clone()), events, stats)
    }

    fn states_with(trapped: &[usize]) -> Vec<SlotState> {
        let mut states = vec![SlotState::Default; 8];
        for &i in trapped {
            states[i] = SlotState::Trapped;
        }
        states
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_resync_starts_and_stops() {
        let table = SlotTable::standard();
        let (mut mgr, _events, stats) = manager();

        assert!(mgr.resync(&table, &states_with(&[3])).unwrap());
        assert_eq!(mgr.lifecycle().get(), ThreadLifecycle::Running);
        assert_eq!(mgr.current_mask(), SignalMask::from_iter([Signal::SIGUSR1]));

        assert!(mgr.resync(&table, &states_with(&[])).unwrap());
        assert!(mgr.current_mask().is_empty());
        assert_eq!(mgr.lifecycle().get(), ThreadLifecycle::Stopped);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.threads_started, 1);
        assert_eq!(snapshot.threads_joined, 1);
        assert_eq!(snapshot.restarts, 0);
    }

    #[test]
    fn test_unchanged_mask_is_noop() {
        let table = SlotTable::standard();
        let (mut mgr, _events, stats) = manager();

        mgr.resync(&table, &states_with(&[3, 4])).unwrap();
        assert!(!mgr.resync(&table, &states_with(&[4, 3])).unwrap());
        assert_eq!(stats.snapshot().threads_started, 1);
    }

    #[test]
    fn test_mask_change_restarts() {
        let table = SlotTable::standard();
        let (mut mgr, _events, stats) = manager();

        mgr.resync(&table, &states_with(&[3])).unwrap();
        mgr.resync(&table, &states_with(&[3, 4])).unwrap();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.threads_started, 2);
        assert_eq!(snapshot.threads_joined, 1);
        assert_eq!(snapshot.restarts, 1);
        assert_eq!(snapshot.live_threads(), 1);
    }

    #[test]
    fn test_thread_records_directed_signal() {
        let table = SlotTable::standard();
        let (mut mgr, events, stats) = manager();

        mgr.resync(&table, &states_with(&[4])).unwrap();
        mgr.signal_thread(Signal::SIGUSR2).unwrap();

        assert_eq!(events.take_timeout(&table, Duration::from_secs(5)).unwrap(), Some(SlotId::new(4)));
        assert_eq!(stats.snapshot().events_recorded, 1);
    }

    #[test]
    fn test_drop_joins_thread() {
        let table = SlotTable::standard();
        let (mut mgr, _events, stats) = manager();
        mgr.resync(&table, &states_with(&[0, 7])).unwrap();
        drop(mgr);
        wait_for(|| stats.snapshot().threads_joined == 1);
    }
}
