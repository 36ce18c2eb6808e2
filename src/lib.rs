/*!
 * POSIX Signal Multiplexer
 * Trap, ignore, or restore OS signals per slot and wait for them from any thread
 */

pub mod config;
pub mod monitoring;
pub mod signals;

// Re-exports
pub use config::SignalConfig;
pub use monitoring::init_tracing;
pub use signals::{
    block_catalogue_in_current_thread, HostBridge, Signal, SignalConsumer, SignalControl,
    SignalError, SignalResult, SignalSubsystem, SlotId, SlotState, SlotTable,
};
