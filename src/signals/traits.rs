/*!
 * Signal Traits
 * Seams between the subsystem and its callers
 */

use super::types::{SignalMask, SignalResult, SlotId, SlotState};
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::time::Duration;

/// Disposition control
pub trait SignalControl: Send + Sync {
    /// Move a slot to a new state
    fn set_state(&self, slot: SlotId, state: SlotState) -> SignalResult<()>;

    /// Current state of a slot
    fn state_of(&self, slot: SlotId) -> SignalResult<SlotState>;
}

/// Consumer side
pub trait SignalConsumer: Send + Sync {
    /// Block until a trapped signal has fired, returning its slot
    fn wait_for_signal(&self) -> SignalResult<SlotId>;

    /// Bounded variant of `wait_for_signal`
    fn wait_for_signal_timeout(&self, timeout: Duration) -> SignalResult<Option<SlotId>>;

    /// OS signal behind a slot
    fn signal_number_of(&self, slot: SlotId) -> SignalResult<Signal>;

    /// Send an OS signal to a process
    fn send(&self, pid: Pid, signal: Signal) -> SignalResult<()>;
}

/// Instrumentation hook on delivery thread lifecycle
///
/// Called from whichever thread drives a resync, with the controller lock
/// held. Implementations must not call back into the subsystem.
pub trait DeliveryObserver: Send + Sync {
    fn thread_started(&self, _mask: SignalMask) {}

    fn thread_joined(&self, _mask: SignalMask) {}
}

/// Combined subsystem trait
pub trait SignalMultiplexer: SignalControl + SignalConsumer {}

impl<T> SignalMultiplexer for T where T: SignalControl + SignalConsumer {}
