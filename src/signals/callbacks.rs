/*!
 * Signal Listener Registry
 * Per-slot callbacks invoked by the dispatcher
 */

use super::types::SlotId;
use ahash::RandomState;
use dashmap::DashMap;
use log::{debug, error, info};
use nix::sys::signal::Signal;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Listener callback type
pub type ListenerFn = Arc<dyn Fn(SlotId, Signal) + Send + Sync>;

struct Listener {
    slot: SlotId,
    callback: ListenerFn,
}

/// Registry of slot listeners
///
/// # Performance
/// - Cache-line aligned to prevent false sharing of atomic ID counter
#[repr(C, align(64))]
#[derive(Clone)]
pub struct ListenerRegistry {
    listeners: Arc<DashMap<u64, Listener, RandomState>>,
    next_id: Arc<AtomicU64>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(DashMap::with_hasher(RandomState::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a listener for `slot`, returning its id
    pub fn register<F>(&self, slot: SlotId, listener: F) -> u64
    where
        F: Fn(SlotId, Signal) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.insert(
            id,
            Listener {
                slot,
                callback: Arc::new(listener),
            },
        );
        info!("Registered listener {} on slot {}", id, slot);
        id
    }

    pub fn unregister(&self, listener_id: u64) -> bool {
        let removed = self.listeners.remove(&listener_id).is_some();
        if removed {
            info!("Unregistered listener {}", listener_id);
        }
        removed
    }

    /// Listeners for `slot` in registration order
    fn listeners_for(&self, slot: SlotId) -> Vec<(u64, ListenerFn)> {
        let mut found: Vec<(u64, ListenerFn)> = self
            .listeners
            .iter()
            .filter(|entry| entry.value().slot == slot)
            .map(|entry| (*entry.key(), entry.value().callback.clone()))
            .collect();
        found.sort_unstable_by_key(|(id, _)| *id);
        found
    }

    /// Invoke every listener on `slot`, returning how many ran to completion
    ///
    /// Callbacks run outside the map's shard locks, so a listener may
    /// register or unregister others. A panicking listener is logged and
    /// skipped.
    pub fn dispatch(&self, slot: SlotId, signal: Signal) -> usize {
        let listeners = self.listeners_for(slot);
        debug!("Dispatching {} to {} listener(s) on slot {}", signal, listeners.len(), slot);

        let mut completed = 0;
        for (id, callback) in listeners {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(slot, signal))) {
                Ok(()) => completed += 1,
                Err(_) => error!("Listener {} panicked handling {} on slot {}", id, signal, slot),
            }
        }
        completed
    }

    pub fn exists(&self, listener_id: u64) -> bool {
        self.listeners.contains_key(&listener_id)
    }

    pub fn count(&self) -> usize {
        self.listeners.len()
    }

    pub fn count_for(&self, slot: SlotId) -> usize {
        self.listeners
            .iter()
            .filter(|entry| entry.value().slot == slot)
            .count()
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_dispatch_in_registration_order() {
        let registry = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            registry.register(SlotId::new(1), move |_, _| seen.lock().push(tag));
        }
        registry.register(SlotId::new(2), |_, _| panic!("wrong slot"));

        assert_eq!(registry.dispatch(SlotId::new(1), Signal::SIGINT), 3);
        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_unregister() {
        let registry = ListenerRegistry::new();
        let id = registry.register(SlotId::new(0), |_, _| {});
        assert!(registry.exists(id));
        assert_eq!(registry.count_for(SlotId::new(0)), 1);

        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert_eq!(registry.count(), 0);
        assert_eq!(registry.dispatch(SlotId::new(0), Signal::SIGHUP), 0);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let registry = ListenerRegistry::new();
        let hits = Arc::new(AtomicU64::new(0));

        registry.register(SlotId::new(6), |_, _| panic!("listener failure"));
        {
            let hits = hits.clone();
            registry.register(SlotId::new(6), move |slot, signal| {
                assert_eq!(slot, SlotId::new(6));
                assert_eq!(signal, Signal::SIGTERM);
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(registry.dispatch(SlotId::new(6), Signal::SIGTERM), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
