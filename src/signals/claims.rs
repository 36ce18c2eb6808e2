/*!
 * Process-Wide Signal Claims
 * Which OS signals some live subsystem currently disposes of
 *
 * Dispositions and sigwait are per process, so two subsystems touching the
 * same signal would both install actions and park two delivery threads on
 * it. A slot claims its signal when it leaves `Default` and releases it on
 * the way back.
 */

use super::types::SignalMask;
use log::debug;
use nix::sys::signal::Signal;
use parking_lot::{const_mutex, Mutex};

static CLAIMED: Mutex<SignalMask> = const_mutex(SignalMask::EMPTY);

/// Claim `signal`; false if another slot in the process already holds it
pub(crate) fn claim(signal: Signal) -> bool {
    let mut claimed = CLAIMED.lock();
    if claimed.contains(signal) {
        return false;
    }
    claimed.insert(signal);
    debug!("Claimed {}", signal);
    true
}

pub(crate) fn release(signal: Signal) {
    CLAIMED.lock().remove(signal);
    debug!("Released {}", signal);
}

/// True while some subsystem in the process holds `signal`
pub fn is_claimed(signal: Signal) -> bool {
    CLAIMED.lock().contains(signal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_claim_is_exclusive_until_released() {
        let signal = Signal::SIGWINCH;
        assert!(claim(signal));
        assert!(is_claimed(signal));
        assert!(!claim(signal));

        release(signal);
        assert!(!is_claimed(signal));
        assert!(claim(signal));
        release(signal);
    }
}
