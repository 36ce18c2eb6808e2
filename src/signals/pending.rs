/*!
 * Pending-Event Store
 * Per-signal occurrence counters shared between the delivery thread and waiters
 */

use super::slots::SlotTable;
use super::types::{SignalError, SignalResult, SlotId};
use nix::sys::signal::Signal;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub(crate) struct PendingState {
    /// True iff `total > 0`
    aggregate: bool,
    /// Indexed by OS signal number
    counts: Box<[u32]>,
    total: u64,
    closed: bool,
}

impl PendingState {
    /// Lowest slot id with a nonzero count wins
    fn take_lowest(&mut self, table: &SlotTable) -> Option<SlotId> {
        let (slot, signal) = table
            .iter()
            .find(|(_, signal)| self.counts[*signal as usize] > 0)?;

        self.counts[signal as usize] -= 1;
        self.total -= 1;
        self.aggregate = self.total > 0;
        Some(slot)
    }
}

/// Counters plus the condition variable waiters sleep on
///
/// Written only by the delivery thread, drained only by consumers, both
/// under the same lock. Broadcasts happen with the lock held so an increment
/// is visible to every waiter it wakes.
pub struct PendingEvents {
    state: Mutex<PendingState>,
    ready: Condvar,
}

impl PendingEvents {
    pub fn new() -> Self {
        let slots = Signal::iterator().map(|s| s as usize).max().unwrap_or(0) + 1;
        Self {
            state: Mutex::new(PendingState {
                aggregate: false,
                counts: vec![0; slots].into_boxed_slice(),
                total: 0,
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Count one occurrence of `signal` and wake all waiters
    pub fn record(&self, signal: Signal) {
        self.record_if(signal, || true);
    }

    /// Count `signal` only if `keep` still holds once the lock is taken
    ///
    /// The delivery thread passes its stop flag here, so an occurrence
    /// captured after a restart was requested is dropped instead of counted.
    pub(crate) fn record_if(&self, signal: Signal, keep: impl FnOnce() -> bool) -> bool {
        let mut state = self.state.lock();
        if !keep() {
            return false;
        }
        state.counts[signal as usize] = state.counts[signal as usize].saturating_add(1);
        state.total += 1;
        state.aggregate = true;
        self.ready.notify_all();
        true
    }

    /// Block until a catalogue signal is pending, then consume it
    pub fn take(&self, table: &SlotTable) -> SignalResult<SlotId> {
        let mut state = self.state.lock();
        loop {
            if let Some(slot) = Self::take_or_closed(&mut state, table)? {
                return Ok(slot);
            }
            self.ready.wait(&mut state);
        }
    }

    /// Like `take`, giving up after `timeout`
    pub fn take_timeout(&self, table: &SlotTable, timeout: Duration) -> SignalResult<Option<SlotId>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(slot) = Self::take_or_closed(&mut state, table)? {
                return Ok(Some(slot));
            }
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                return Self::take_or_closed(&mut state, table);
            }
        }
    }

    /// Consume a pending event without blocking
    pub fn try_take(&self, table: &SlotTable) -> SignalResult<Option<SlotId>> {
        Self::take_or_closed(&mut self.state.lock(), table)
    }

    fn take_or_closed(
        state: &mut MutexGuard<'_, PendingState>,
        table: &SlotTable,
    ) -> SignalResult<Option<SlotId>> {
        if state.aggregate {
            if let Some(slot) = state.take_lowest(table) {
                return Ok(Some(slot));
            }
        }
        if state.closed {
            return Err(SignalError::Closed);
        }
        Ok(None)
    }

    /// Occurrences of `signal` not yet consumed
    pub fn pending_for(&self, signal: Signal) -> u32 {
        self.state.lock().counts[signal as usize]
    }

    pub fn total(&self) -> u64 {
        self.state.lock().total
    }

    pub fn has_pending(&self) -> bool {
        self.state.lock().aggregate
    }

    /// Wake every waiter; once drained, waits fail with `Closed`
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Hold the store lock, stalling the delivery thread before it records
    #[cfg(test)]
    pub(crate) fn hold(&self) -> MutexGuard<'_, PendingState> {
        self.state.lock()
    }
}

impl Default for PendingEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_lowest_slot_wins_repeatably() {
        let table = SlotTable::standard();
        let store = PendingEvents::new();

        // slot 6 (TERM) recorded before slot 3 (USR1)
        store.record(Signal::SIGTERM);
        store.record(Signal::SIGUSR1);
        store.record(Signal::SIGTERM);
        store.record(Signal::SIGUSR1);

        let order: Vec<usize> = (0..4).map(|_| store.take(&table).unwrap().index()).collect();
        assert_eq!(order, vec![3, 3, 6, 6]);
        assert!(!store.has_pending());
        assert_eq!(store.total(), 0);
    }

    #[test]
    fn test_aggregate_tracks_counts() {
        let table = SlotTable::standard();
        let store = PendingEvents::new();
        assert!(!store.has_pending());

        store.record(Signal::SIGHUP);
        store.record(Signal::SIGWINCH);
        assert!(store.has_pending());
        assert_eq!(store.pending_for(Signal::SIGHUP), 1);

        assert_eq!(store.try_take(&table).unwrap(), Some(SlotId::new(0)));
        // one still pending, flag must stay set
        assert!(store.has_pending());
        assert_eq!(store.try_take(&table).unwrap(), Some(SlotId::new(7)));
        assert!(!store.has_pending());
        assert_eq!(store.try_take(&table).unwrap(), None);
    }

    #[test]
    fn test_take_blocks_until_record() {
        let table = Arc::new(SlotTable::standard());
        let store = Arc::new(PendingEvents::new());

        let waiter = {
            let table = table.clone();
            let store = store.clone();
            thread::spawn(move || store.take(&table))
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        store.record(Signal::SIGQUIT);
        assert_eq!(waiter.join().unwrap().unwrap(), SlotId::new(2));
    }

    #[test]
    fn test_take_timeout_expires() {
        let table = SlotTable::standard();
        let store = PendingEvents::new();
        let start = Instant::now();
        assert_eq!(store.take_timeout(&table, Duration::from_millis(30)).unwrap(), None);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_close_drains_then_fails() {
        let table = SlotTable::standard();
        let store = PendingEvents::new();
        store.record(Signal::SIGINT);
        store.close();

        assert_eq!(store.take(&table).unwrap(), SlotId::new(1));
        assert_eq!(store.take(&table), Err(SignalError::Closed));
    }

    #[test]
    fn test_close_wakes_blocked_waiter() {
        let table = Arc::new(SlotTable::standard());
        let store = Arc::new(PendingEvents::new());

        let waiter = {
            let table = table.clone();
            let store = store.clone();
            thread::spawn(move || store.take(&table))
        };

        thread::sleep(Duration::from_millis(20));
        store.close();
        assert_eq!(waiter.join().unwrap(), Err(SignalError::Closed));
    }

    #[test]
    fn test_record_if_rejected_leaves_store_untouched() {
        let store = PendingEvents::new();
        assert!(!store.record_if(Signal::SIGUSR2, || false));
        assert_eq!(store.pending_for(Signal::SIGUSR2), 0);
        assert!(!store.has_pending());
    }
}
