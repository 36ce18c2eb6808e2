/*!
 * Signals Module
 * Slot-based multiplexing of POSIX signals onto a blocking wait
 */

mod atomic_stats;
mod callbacks;
mod claims;
mod controller;
mod delivery;
mod dispatcher;
pub mod disposition;
mod host;
pub mod limits;
mod manager;
pub mod pending;
mod slots;
pub mod traits;
pub mod types;

// Re-export public API
pub use callbacks::{ListenerFn, ListenerRegistry};
pub use claims::is_claimed;
pub use delivery::ThreadLifecycle;
pub use disposition::{Disposition, DispositionKind};
pub use host::HostBridge;
pub use manager::{SignalSubsystem, SignalSubsystemBuilder};
pub use slots::{block_catalogue_in_current_thread, SlotTable};
pub use traits::*;
pub use types::{
    DeliveryStats, SignalError, SignalMask, SignalResult, SlotId, SlotSnapshot, SlotState,
};

pub use nix::sys::signal::Signal;
