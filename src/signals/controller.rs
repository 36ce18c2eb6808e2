/*!
 * Disposition Controller
 * Validates slot state transitions and drives the delivery thread manager
 */

use super::claims;
use super::delivery::{DeliveryThreadManager, LifecycleCell};
use super::disposition::{install_default, install_ignore, Disposition};
use super::slots::SlotTable;
use super::types::{SignalError, SignalMask, SignalResult, SlotId, SlotState};
use log::{debug, error, info, warn};
use nix::sys::signal::Signal;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
struct SlotRecord {
    state: SlotState,
    /// Captured on the first transition out of `Default`, then never again
    saved: Option<Disposition>,
}

struct ControllerState {
    slots: Vec<SlotRecord>,
    delivery: DeliveryThreadManager,
}

impl ControllerState {
    fn states(&self) -> Vec<SlotState> {
        self.slots.iter().map(|r| r.state).collect()
    }
}

/// Serializes every slot state change and OS disposition change
///
/// One lock covers the slot records, the `sigaction` calls, and the
/// delivery thread manager, so concurrent `set_state` calls cannot race on
/// a slot or start a second delivery thread.
pub struct DispositionController {
    table: Arc<SlotTable>,
    inner: Mutex<ControllerState>,
    lifecycle: Arc<LifecycleCell>,
}

impl DispositionController {
    pub fn new(table: Arc<SlotTable>, delivery: DeliveryThreadManager) -> Self {
        let slots = vec![
            SlotRecord {
                state: SlotState::Default,
                saved: None,
            };
            table.len()
        ];
        let lifecycle = delivery.lifecycle();
        Self {
            table,
            inner: Mutex::new(ControllerState { slots, delivery }),
            lifecycle,
        }
    }

    /// Move `slot` to `state`
    ///
    /// Same-state requests return immediately: no OS call, no resync.
    /// Leaving `Default` claims the signal for this process-wide instance and
    /// fails with `SignalClaimed` if another subsystem holds it. The first
    /// move out of `Default` also reads the OS disposition and refuses with
    /// `OwnershipConflict` if a handler is already installed.
    pub fn set_state(&self, slot: SlotId, state: SlotState) -> SignalResult<()> {
        let signal = self.table.signal_of(slot)?;
        let mut inner = self.inner.lock();

        let previous = inner.slots[slot.index()].state;
        if previous == state {
            debug!("Slot {} ({}) already {}", slot, signal, state);
            return Ok(());
        }

        let claiming = previous == SlotState::Default;
        if claiming && !claims::claim(signal) {
            warn!("Refusing {} for slot {}: {} is held by another subsystem", state, slot, signal);
            return Err(SignalError::SignalClaimed { slot, signal });
        }

        match self.transition(&mut inner, slot, signal, previous, state) {
            Ok(()) => {
                if state == SlotState::Default {
                    claims::release(signal);
                }
                info!("Slot {} ({}): {} -> {}", slot, signal, previous, state);
                Ok(())
            }
            Err(e) => {
                if claiming {
                    claims::release(signal);
                }
                Err(e)
            }
        }
    }

    /// Install `state` for `slot` and resync; on error the slot is left as it was
    fn transition(
        &self,
        inner: &mut ControllerState,
        slot: SlotId,
        signal: Signal,
        previous: SlotState,
        state: SlotState,
    ) -> SignalResult<()> {
        let saved = match inner.slots[slot.index()].saved {
            Some(saved) => saved,
            None => {
                let seen = Disposition::query(signal)?;
                if !seen.is_unclaimed() {
                    warn!(
                        "Refusing {} for slot {}: {} already has a handler",
                        state, slot, signal
                    );
                    return Err(SignalError::OwnershipConflict { slot, signal });
                }
                seen
            }
        };

        apply(signal, state, &saved)?;
        inner.slots[slot.index()].saved = Some(saved);
        inner.slots[slot.index()].state = state;

        if previous == SlotState::Trapped || state == SlotState::Trapped {
            let states = inner.states();
            if let Err(e) = inner.delivery.resync(&self.table, &states) {
                error!(
                    "Resync failed moving slot {} to {}, rolling back: {}",
                    slot, state, e
                );
                inner.slots[slot.index()].state = previous;
                if let Err(re) = apply(signal, previous, &saved) {
                    error!("Failed to restore disposition of {}: {}", signal, re);
                }
                let states = inner.states();
                if let Err(re) = inner.delivery.resync(&self.table, &states) {
                    error!("Resync after rollback failed: {}", re);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn state_of(&self, slot: SlotId) -> SignalResult<SlotState> {
        self.table.signal_of(slot)?;
        Ok(self.inner.lock().slots[slot.index()].state)
    }

    /// States of every slot, in id order
    pub fn states(&self) -> Vec<SlotState> {
        self.inner.lock().states()
    }

    /// Disposition captured when `slot` first left `Default`
    pub fn saved_disposition(&self, slot: SlotId) -> SignalResult<Option<Disposition>> {
        self.table.signal_of(slot)?;
        Ok(self.inner.lock().slots[slot.index()].saved)
    }

    /// Mask the delivery thread currently waits on
    pub fn delivery_mask(&self) -> SignalMask {
        self.inner.lock().delivery.current_mask()
    }

    /// Lifecycle of the delivery thread, readable while a resync is in flight
    pub fn lifecycle(&self) -> Arc<LifecycleCell> {
        self.lifecycle.clone()
    }

    /// Return every slot to `Default` and stop the delivery thread
    ///
    /// Keeps going past individual failures and reports the first one. A
    /// slot whose restore fails keeps its state and claim, and if it is still
    /// `Trapped` the delivery thread stays up on the remaining mask.
    pub fn restore_all(&self) -> SignalResult<()> {
        self.restore_all_with(|saved, signal| saved.restore(signal))
    }

    fn restore_all_with(
        &self,
        restore: impl Fn(&Disposition, Signal) -> SignalResult<()>,
    ) -> SignalResult<()> {
        let mut inner = self.inner.lock();
        let mut first_error = None;

        for (slot, signal) in self.table.iter() {
            let record = inner.slots[slot.index()];
            if record.state == SlotState::Default {
                continue;
            }
            let restored = match &record.saved {
                Some(saved) => restore(saved, signal),
                None => Ok(()),
            };
            match restored {
                Ok(()) => {
                    inner.slots[slot.index()].state = SlotState::Default;
                    claims::release(signal);
                    info!("Slot {} ({}): {} -> default", slot, signal, record.state);
                }
                Err(e) => {
                    error!("Failed to restore {} for slot {}: {}", signal, slot, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        let states = inner.states();
        if let Err(e) = inner.delivery.resync(&self.table, &states) {
            first_error.get_or_insert(e);
        }
        if states.contains(&SlotState::Trapped) {
            warn!(
                "Delivery thread kept on {} for slots that failed to restore",
                inner.delivery.current_mask()
            );
        } else {
            inner.delivery.stop();
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_delivery<R>(&self, f: impl FnOnce(&DeliveryThreadManager) -> R) -> R {
        f(&self.inner.lock().delivery)
    }
}

impl Drop for DispositionController {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        for (slot, signal) in self.table.iter() {
            if inner.slots[slot.index()].state != SlotState::Default {
                claims::release(signal);
            }
        }
    }
}

/// Install the OS action implied by `state`
fn apply(signal: Signal, state: SlotState, saved: &Disposition) -> SignalResult<()> {
    match state {
        SlotState::Default => saved.restore(signal),
        SlotState::Ignored => install_ignore(signal),
        SlotState::Trapped => install_default(signal),
    }
}
