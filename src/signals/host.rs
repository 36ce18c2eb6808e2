/*!
 * Host Bridge
 * Integer-typed entry points for a host runtime embedding the subsystem
 */

use super::manager::SignalSubsystem;
use super::traits::{SignalConsumer, SignalControl};
use super::types::{SignalResult, SlotState};
use crate::config::SignalConfig;
use log::{debug, warn};
use nix::errno::Errno;
use std::sync::Arc;

/// Raw-integer façade over a shared [`SignalSubsystem`]
#[derive(Clone)]
pub struct HostBridge {
    subsystem: Arc<SignalSubsystem>,
}

impl HostBridge {
    /// Build the subsystem and return the undo flag hosts pass to semop
    ///
    /// The flag is opaque to this crate and forwarded unchanged.
    pub fn init(config: SignalConfig) -> SignalResult<(Self, i32)> {
        let subsystem = Arc::new(SignalSubsystem::new(config)?);
        debug!("Host bridge initialized");
        Ok((Self { subsystem }, libc::SEM_UNDO))
    }

    pub fn from_subsystem(subsystem: Arc<SignalSubsystem>) -> Self {
        Self { subsystem }
    }

    pub fn subsystem(&self) -> &Arc<SignalSubsystem> {
        &self.subsystem
    }

    /// `state` is 0 (default), 1 (ignored) or 2 (trapped)
    pub fn set_state(&self, slot: i32, state: i32) -> SignalResult<()> {
        let slot = self.subsystem.slot(i64::from(slot))?;
        let state = SlotState::from_raw(state)?;
        self.subsystem.set_state(slot, state)
    }

    /// Block for the next trapped signal; -1 once the subsystem is shut down
    pub fn wait_for_signal(&self) -> i32 {
        match self.subsystem.wait_for_signal() {
            Ok(slot) => slot.index() as i32,
            Err(e) => {
                warn!("wait_for_signal failed: {}", e);
                -1
            }
        }
    }

    pub fn signal_number_of(&self, slot: i32) -> SignalResult<i32> {
        let slot = self.subsystem.slot(i64::from(slot))?;
        Ok(self.subsystem.signal_number_of(slot)? as i32)
    }

    /// Send `signal` to `pid`, returning 0 or the OS error code
    ///
    /// The number goes to kill(2) unchecked, so real-time signals work and
    /// the kernel decides validity. Signal 0 probes for existence and
    /// permission without sending.
    pub fn send(&self, pid: i32, signal: i32) -> i32 {
        // SAFETY: kill(2) takes plain integers and touches no memory.
        match Errno::result(unsafe { libc::kill(pid, signal) }) {
            Ok(_) => 0,
            Err(e) => {
                debug!("kill({}, {}) failed: {}", pid, signal, e);
                e as i32
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::types::SignalError;
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_init_returns_sem_undo() {
        let (bridge, flag) = HostBridge::init(SignalConfig::default()).unwrap();
        assert_eq!(flag, libc::SEM_UNDO);
        assert_eq!(bridge.signal_number_of(6).unwrap(), libc::SIGTERM);
        assert_eq!(bridge.signal_number_of(8), Err(SignalError::InvalidSlot(8)));
        assert_eq!(bridge.signal_number_of(-1), Err(SignalError::InvalidSlot(-1)));
    }

    #[test]
    #[serial]
    fn test_set_state_validates_integers() {
        let (bridge, _) = HostBridge::init(SignalConfig::default()).unwrap();
        assert_eq!(bridge.set_state(9, 1), Err(SignalError::InvalidSlot(9)));
        assert_eq!(bridge.set_state(7, 5), Err(SignalError::InvalidState(5)));

        bridge.set_state(7, 1).unwrap();
        bridge.set_state(7, 0).unwrap();
    }

    #[test]
    fn test_send_returns_errno() {
        let (bridge, _) = HostBridge::init(SignalConfig::default()).unwrap();
        let me = std::process::id() as i32;

        assert_eq!(bridge.send(me, 0), 0);
        assert_eq!(bridge.send(me, 9999), Errno::EINVAL as i32);
        // PID_MAX on Linux is at most 2^22
        assert_eq!(bridge.send(i32::MAX, 0), Errno::ESRCH as i32);
    }

    #[test]
    #[serial]
    fn test_wait_after_shutdown_is_minus_one() {
        let (bridge, _) = HostBridge::init(SignalConfig::default()).unwrap();
        bridge.subsystem().shutdown().unwrap();
        assert_eq!(bridge.wait_for_signal(), -1);
    }

    #[test]
    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn test_send_passes_realtime_signals_to_kernel() {
        let (bridge, _) = HostBridge::init(SignalConfig::default()).unwrap();
        let rt = libc::SIGRTMIN();

        let direct = match Errno::result(unsafe { libc::kill(i32::MAX, rt) }) {
            Ok(_) => 0,
            Err(e) => e as i32,
        };
        assert_eq!(bridge.send(i32::MAX, rt), direct);
        assert_eq!(bridge.send(i32::MAX, rt), Errno::ESRCH as i32);
        assert_eq!(bridge.send(i32::MAX, libc::SIGRTMAX()), Errno::ESRCH as i32);
    }
}
