/*!
 * Signal Types
 * Slot identities, slot states, masks, and the subsystem error type
 */

use miette::Diagnostic;
use nix::errno::Errno;
use nix::sys::signal::{SigSet, Signal};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Signal operation result
pub type SignalResult<T> = Result<T, SignalError>;

/// Signal subsystem errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum SignalError {
    #[error("Invalid signal slot: {0}")]
    #[diagnostic(
        code(signals::invalid_slot),
        help("Slot ids run from 0 to the catalogue size minus one.")
    )]
    InvalidSlot(i64),

    #[error("Invalid slot state: {0}")]
    #[diagnostic(
        code(signals::invalid_state),
        help("Use 0 (default), 1 (ignored) or 2 (trapped).")
    )]
    InvalidState(i32),

    #[error("Signal {signal} (slot {slot}) is already handled elsewhere in the process")]
    #[diagnostic(
        code(signals::ownership_conflict),
        help("Another library or the host runtime installed a handler for this signal. Leave the slot at its default state.")
    )]
    OwnershipConflict { slot: SlotId, signal: Signal },

    #[error("Signal {signal} (slot {slot}) is held by another signal subsystem in this process")]
    #[diagnostic(
        code(signals::signal_claimed),
        help("Shut the other subsystem down first, or share one instance through an Arc.")
    )]
    SignalClaimed { slot: SlotId, signal: Signal },

    #[error("OS call failed: {0}")]
    #[diagnostic(code(signals::os_error))]
    Os(#[from] Errno),

    #[error("Signal {0} appears more than once in the catalogue")]
    #[diagnostic(
        code(signals::aliased_signal),
        help("Each slot must map to a distinct OS signal.")
    )]
    AliasedSignal(Signal),

    #[error("Signal {0} cannot be trapped or ignored")]
    #[diagnostic(code(signals::uncatchable_signal))]
    UncatchableSignal(Signal),

    #[error("Signal catalogue is empty")]
    #[diagnostic(code(signals::empty_catalogue))]
    EmptyCatalogue,

    #[error("Unknown signal name: {0}")]
    #[diagnostic(
        code(signals::unknown_signal),
        help("Use POSIX names such as SIGHUP or HUP.")
    )]
    UnknownSignal(String),

    #[error("Delivery thread failure: {0}")]
    #[diagnostic(code(signals::delivery_thread))]
    DeliveryThread(String),

    #[error("Signal subsystem is shut down")]
    #[diagnostic(code(signals::closed))]
    Closed,
}

/// Index of a logical slot in the catalogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(usize);

impl SlotId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for SlotId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a slot's signal is disposed of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum SlotState {
    /// Whatever disposition the process had before the slot was touched
    Default = 0,
    /// Signal is discarded by the kernel
    Ignored = 1,
    /// Signal is collected by the delivery thread and surfaced to waiters
    Trapped = 2,
}

impl SlotState {
    /// Convert from the host's integer encoding
    pub fn from_raw(raw: i32) -> SignalResult<Self> {
        match raw {
            0 => Ok(SlotState::Default),
            1 => Ok(SlotState::Ignored),
            2 => Ok(SlotState::Trapped),
            _ => Err(SignalError::InvalidState(raw)),
        }
    }

    #[inline]
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlotState::Default => "default",
            SlotState::Ignored => "ignored",
            SlotState::Trapped => "trapped",
        };
        f.write_str(name)
    }
}

/// Set of OS signal numbers, one bit per signal
///
/// Compared by value, so two masks built in different orders are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SignalMask(u64);

impl SignalMask {
    pub const EMPTY: SignalMask = SignalMask(0);

    #[inline]
    fn bit(signal: Signal) -> u64 {
        1u64 << ((signal as i32 - 1) as u32 & 63)
    }

    pub fn insert(&mut self, signal: Signal) {
        self.0 |= Self::bit(signal);
    }

    pub fn remove(&mut self, signal: Signal) {
        self.0 &= !Self::bit(signal);
    }

    pub fn contains(&self, signal: Signal) -> bool {
        self.0 & Self::bit(signal) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Member signals in ascending signal-number order
    pub fn iter(&self) -> impl Iterator<Item = Signal> + '_ {
        Signal::iterator().filter(move |s| self.contains(*s))
    }

    /// Lowest-numbered member, used to wake a thread parked on this mask
    pub fn first(&self) -> Option<Signal> {
        self.iter().next()
    }

    pub fn to_sigset(&self) -> SigSet {
        let mut set = SigSet::empty();
        for signal in self.iter() {
            set.add(signal);
        }
        set
    }
}

impl FromIterator<Signal> for SignalMask {
    fn from_iter<I: IntoIterator<Item = Signal>>(iter: I) -> Self {
        let mut mask = SignalMask::EMPTY;
        for signal in iter {
            mask.insert(signal);
        }
        mask
    }
}

impl fmt::Display for SignalMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|s| s.as_str()).collect();
        write!(f, "{{{}}}", names.join(","))
    }
}

/// Point-in-time view of one slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSnapshot {
    pub slot: SlotId,
    pub signal: String,
    pub signal_number: i32,
    pub state: SlotState,
    pub pending: u32,
}

/// Delivery statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub threads_started: u64,
    pub threads_joined: u64,
    pub signals_captured: u64,
    pub events_recorded: u64,
    pub events_dropped: u64,
    pub events_consumed: u64,
    pub resyncs: u64,
    pub restarts: u64,
}

impl DeliveryStats {
    /// Delivery threads currently alive according to the counters
    pub fn live_threads(&self) -> u64 {
        self.threads_started.saturating_sub(self.threads_joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_state_raw_round_trip_and_rejects() {
        assert_eq!(SlotState::from_raw(0).unwrap(), SlotState::Default);
        assert_eq!(SlotState::from_raw(2).unwrap(), SlotState::Trapped);
        assert_eq!(SlotState::Ignored.as_raw(), 1);
        assert_eq!(SlotState::from_raw(3), Err(SignalError::InvalidState(3)));
        assert_eq!(SlotState::from_raw(-1), Err(SignalError::InvalidState(-1)));
    }

    #[test]
    fn test_mask_equality_ignores_insertion_order() {
        let a: SignalMask = [Signal::SIGUSR2, Signal::SIGHUP].into_iter().collect();
        let b: SignalMask = [Signal::SIGHUP, Signal::SIGUSR2].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.first(), Some(Signal::SIGHUP));
        assert!(!a.contains(Signal::SIGTERM));

        let mut c = a;
        c.remove(Signal::SIGHUP);
        c.remove(Signal::SIGTERM);
        assert_eq!(c, [Signal::SIGUSR2].into_iter().collect::<SignalMask>());
    }

    #[test]
    fn test_mask_to_sigset() {
        let mask: SignalMask = [Signal::SIGINT, Signal::SIGTERM].into_iter().collect();
        let set = mask.to_sigset();
        assert!(set.contains(Signal::SIGINT));
        assert!(set.contains(Signal::SIGTERM));
        assert!(!set.contains(Signal::SIGHUP));
        assert!(SignalMask::EMPTY.is_empty());
        assert_eq!(SignalMask::EMPTY.first(), None);
    }

    #[test]
    fn test_live_threads() {
        let stats = DeliveryStats {
            threads_started: 3,
            threads_joined: 2,
            ..Default::default()
        };
        assert_eq!(stats.live_threads(), 1);
    }
}
