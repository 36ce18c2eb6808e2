/*!
 * Lock-Free Delivery Statistics
 * Atomic counters updated from the delivery thread and consumer paths
 */

use super::types::DeliveryStats;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic delivery statistics
///
/// # Performance
/// - Cache-line aligned to prevent false sharing
/// - Counters use relaxed ordering; the start/join pair uses SeqCst so an
///   observer never sees a join before its matching start
#[repr(C, align(64))]
pub struct AtomicDeliveryStats {
    threads_started: AtomicU64,
    threads_joined: AtomicU64,
    signals_captured: AtomicU64,
    events_recorded: AtomicU64,
    events_dropped: AtomicU64,
    events_consumed: AtomicU64,
    resyncs: AtomicU64,
    restarts: AtomicU64,
}

impl AtomicDeliveryStats {
    #[inline]
    pub const fn new() -> Self {
        Self {
            threads_started: AtomicU64::new(0),
            threads_joined: AtomicU64::new(0),
            signals_captured: AtomicU64::new(0),
            events_recorded: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            events_consumed: AtomicU64::new(0),
            resyncs: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc_threads_started(&self) {
        self.threads_started.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn inc_threads_joined(&self) {
        self.threads_joined.fetch_add(1, Ordering::SeqCst);
    }

    /// Hot path - delivery thread, once per sigwait return
    #[inline(always)]
    pub fn inc_captured(&self) {
        self.signals_captured.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_recorded(&self) {
        self.events_recorded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_consumed(&self) {
        self.events_consumed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_resyncs(&self) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_restarts(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of the counters
    ///
    /// # Note
    /// Individual values are exact; the set as a whole may straddle a
    /// concurrent update.
    #[inline]
    pub fn snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            threads_started: self.threads_started.load(Ordering::SeqCst),
            threads_joined: self.threads_joined.load(Ordering::SeqCst),
            signals_captured: self.signals_captured.load(Ordering::Relaxed),
            events_recorded: self.events_recorded.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            events_consumed: self.events_consumed.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
        }
    }
}

impl Default for AtomicDeliveryStats {
    fn default() -> Self {
        Self::new()
    }
}
