/*!
 * Slot Table
 * Fixed catalogue mapping logical slots to OS signals
 */

use super::types::{SignalError, SignalMask, SignalResult, SlotId};
use crate::config::SignalConfig;
use nix::sys::signal::{SigmaskHow, Signal};

/// Immutable slot catalogue
///
/// Built once per subsystem. The slot-to-signal mapping never changes
/// afterwards, so lookups need no locking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTable {
    signals: Box<[Signal]>,
}

impl SlotTable {
    /// Validate and build a catalogue
    pub fn new(catalogue: Vec<Signal>) -> SignalResult<Self> {
        if catalogue.is_empty() {
            return Err(SignalError::EmptyCatalogue);
        }

        let mut seen = SignalMask::EMPTY;
        for &signal in &catalogue {
            if matches!(signal, Signal::SIGKILL | Signal::SIGSTOP) {
                return Err(SignalError::UncatchableSignal(signal));
            }
            if seen.contains(signal) {
                return Err(SignalError::AliasedSignal(signal));
            }
            seen.insert(signal);
        }

        Ok(Self {
            signals: catalogue.into_boxed_slice(),
        })
    }

    pub fn from_config(config: &SignalConfig) -> SignalResult<Self> {
        Self::new(config.catalogue.clone())
    }

    /// Standard eight-slot catalogue
    pub fn standard() -> Self {
        Self {
            signals: SignalConfig::standard_catalogue().into_boxed_slice(),
        }
    }

    /// Catalogue that skips validation, for driving OS failure paths
    #[cfg(test)]
    pub(crate) fn unchecked(catalogue: Vec<Signal>) -> Self {
        Self {
            signals: catalogue.into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Validate a raw slot identifier
    pub fn slot(&self, raw: i64) -> SignalResult<SlotId> {
        if raw >= 0 && (raw as u64) < self.signals.len() as u64 {
            Ok(SlotId::new(raw as usize))
        } else {
            Err(SignalError::InvalidSlot(raw))
        }
    }

    /// OS signal behind a slot
    pub fn signal_of(&self, slot: SlotId) -> SignalResult<Signal> {
        self.signals
            .get(slot.index())
            .copied()
            .ok_or(SignalError::InvalidSlot(slot.index() as i64))
    }

    /// Reverse lookup
    pub fn slot_for(&self, signal: Signal) -> Option<SlotId> {
        self.signals
            .iter()
            .position(|&s| s == signal)
            .map(SlotId::new)
    }

    /// Slots in id order
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, Signal)> + '_ {
        self.signals
            .iter()
            .enumerate()
            .map(|(i, &s)| (SlotId::new(i), s))
    }

    /// Every signal in the catalogue
    pub fn mask(&self) -> SignalMask {
        self.signals.iter().copied().collect()
    }
}

/// Block every catalogue signal in the calling thread
///
/// Process-directed signals reach the delivery thread only when no other
/// thread has them unblocked. Call this from `main` before any thread is
/// spawned; spawned threads inherit the mask.
pub fn block_catalogue_in_current_thread(table: &SlotTable) -> SignalResult<()> {
    table
        .mask()
        .to_sigset()
        .thread_swap_mask(SigmaskHow::SIG_BLOCK)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_standard_table_lookups() {
        let table = SlotTable::standard();
        assert_eq!(table.len(), 8);
        assert_eq!(table.signal_of(SlotId::new(0)).unwrap(), Signal::SIGHUP);
        assert_eq!(table.signal_of(SlotId::new(7)).unwrap(), Signal::SIGWINCH);
        assert_eq!(table.slot_for(Signal::SIGUSR1), Some(SlotId::new(3)));
        assert_eq!(table.slot_for(Signal::SIGCHLD), None);
    }

    #[test]
    fn test_rejects_aliased_signal() {
        let err = SlotTable::new(vec![Signal::SIGHUP, Signal::SIGINT, Signal::SIGHUP]).unwrap_err();
        assert_eq!(err, SignalError::AliasedSignal(Signal::SIGHUP));
    }

    #[test]
    fn test_rejects_uncatchable_and_empty() {
        assert_eq!(
            SlotTable::new(vec![Signal::SIGKILL]).unwrap_err(),
            SignalError::UncatchableSignal(Signal::SIGKILL)
        );
        assert_eq!(SlotTable::new(vec![]).unwrap_err(), SignalError::EmptyCatalogue);
    }

    #[test]
    fn test_slot_validation_bounds() {
        let table = SlotTable::standard();
        assert_eq!(table.slot(0).unwrap(), SlotId::new(0));
        assert_eq!(table.slot(7).unwrap(), SlotId::new(7));
        assert_eq!(table.slot(8), Err(SignalError::InvalidSlot(8)));
        assert_eq!(table.slot(-1), Err(SignalError::InvalidSlot(-1)));
    }

    proptest! {
        #[test]
        fn prop_signal_of_is_stable(raw in 0i64..8, repeats in 1usize..16) {
            let table = SlotTable::standard();
            let slot = table.slot(raw).unwrap();
            let first = table.signal_of(slot).unwrap();
            for _ in 0..repeats {
                prop_assert_eq!(table.signal_of(slot).unwrap(), first);
            }
            prop_assert_eq!(table.slot_for(first), Some(slot));
        }

        #[test]
        fn prop_out_of_range_slots_rejected(raw in prop_oneof![i64::MIN..0i64, 8i64..i64::MAX]) {
            let table = SlotTable::standard();
            prop_assert_eq!(table.slot(raw), Err(SignalError::InvalidSlot(raw)));
        }
    }
}
