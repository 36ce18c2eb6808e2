/*!
 * Subsystem Configuration
 * Signal catalogue selection, fixed for the lifetime of a subsystem
 */

use crate::signals::limits::SLOTS_ENV_VAR;
use crate::signals::{SignalError, SignalResult};
use log::warn;
use nix::sys::signal::Signal;
use std::str::FromStr;

/// Catalogue configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalConfig {
    /// OS signal for each slot, indexed by slot id
    pub catalogue: Vec<Signal>,
}

impl SignalConfig {
    /// Catalogue with the given signals, in slot order
    pub fn with_catalogue(catalogue: Vec<Signal>) -> Self {
        Self { catalogue }
    }

    /// The standard eight-slot catalogue
    pub fn standard_catalogue() -> Vec<Signal> {
        vec![
            Signal::SIGHUP,
            Signal::SIGINT,
            Signal::SIGQUIT,
            Signal::SIGUSR1,
            Signal::SIGUSR2,
            power_signal(),
            Signal::SIGTERM,
            Signal::SIGWINCH,
        ]
    }

    /// Load from `SIGMUX_SLOTS`, falling back to the standard catalogue
    ///
    /// A malformed variable is logged and ignored rather than failing startup.
    pub fn from_env() -> Self {
        match std::env::var(SLOTS_ENV_VAR) {
            Ok(raw) if !raw.trim().is_empty() => match parse_catalogue(&raw) {
                Ok(catalogue) => Self { catalogue },
                Err(e) => {
                    warn!("Ignoring {}={:?}: {}", SLOTS_ENV_VAR, raw, e);
                    Self::default()
                }
            },
            _ => Self::default(),
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            catalogue: Self::standard_catalogue(),
        }
    }
}

/// Parse a comma-separated list such as `HUP,SIGINT,usr1`
pub fn parse_catalogue(raw: &str) -> SignalResult<Vec<Signal>> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(parse_signal_name)
        .collect()
}

/// Parse one signal name, with or without the `SIG` prefix
pub fn parse_signal_name(name: &str) -> SignalResult<Signal> {
    let upper = name.to_ascii_uppercase();
    let full = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{}", upper)
    };
    Signal::from_str(&full).map_err(|_| SignalError::UnknownSignal(name.to_string()))
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn power_signal() -> Signal {
    Signal::SIGPWR
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn power_signal() -> Signal {
    Signal::SIGINFO
}
