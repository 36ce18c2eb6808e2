/*!
 * OS Signal Dispositions
 * Query, install, and restore process-wide signal actions
 *
 * Every `sigaction` call in the crate goes through this module. Callers
 * serialize access through the disposition controller's lock.
 */

use super::types::SignalResult;
use nix::errno::Errno;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::fmt;
use std::mem;
use std::ptr;

/// Kind of action currently installed for a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispositionKind {
    Default,
    Ignore,
    /// A handler function owned by someone else
    Handler,
}

/// Saved OS-level action for one signal
#[derive(Clone, Copy)]
pub struct Disposition {
    raw: libc::sigaction,
}

impl Disposition {
    /// Read the action installed for `signal` without changing it
    pub fn query(signal: Signal) -> SignalResult<Self> {
        // SAFETY: a null `act` makes sigaction a pure read into `old`.
        let mut old: libc::sigaction = unsafe { mem::zeroed() };
        let rc = unsafe { libc::sigaction(signal as libc::c_int, ptr::null(), &mut old) };
        if rc != 0 {
            return Err(Errno::last().into());
        }
        Ok(Self { raw: old })
    }

    pub fn kind(&self) -> DispositionKind {
        match self.raw.sa_sigaction {
            libc::SIG_DFL => DispositionKind::Default,
            libc::SIG_IGN => DispositionKind::Ignore,
            _ => DispositionKind::Handler,
        }
    }

    /// True when nobody else has claimed the signal
    pub fn is_unclaimed(&self) -> bool {
        self.kind() != DispositionKind::Handler
    }

    /// Put this saved action back in place
    pub fn restore(&self, signal: Signal) -> SignalResult<()> {
        // SAFETY: `raw` was produced by the kernel for this same signal.
        let rc = unsafe { libc::sigaction(signal as libc::c_int, &self.raw, ptr::null_mut()) };
        if rc != 0 {
            return Err(Errno::last().into());
        }
        Ok(())
    }
}

impl fmt::Debug for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposition")
            .field("kind", &self.kind())
            .field("flags", &self.raw.sa_flags)
            .finish()
    }
}

/// Make the kernel discard `signal`
pub fn install_ignore(signal: Signal) -> SignalResult<()> {
    install(signal, SigHandler::SigIgn)
}

/// Install the default action so `signal` stays deliverable to a waiting thread
pub fn install_default(signal: Signal) -> SignalResult<()> {
    install(signal, SigHandler::SigDfl)
}

fn install(signal: Signal, handler: SigHandler) -> SignalResult<()> {
    let action = SigAction::new(handler, SaFlags::SA_RESTART, SigSet::empty());
    // SAFETY: SigDfl and SigIgn run no user code in signal context.
    unsafe { sigaction(signal, &action) }?;
    Ok(())
}
