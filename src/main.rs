/*!
 * sigtrap - Signal Multiplexer Demo
 *
 * Traps SIGINT and SIGTERM for a fixed time and prints each arrival.
 * Send signals with `kill -INT <pid>` or Ctrl-C.
 *
 * Environment variables:
 * - SIGTRAP_SECONDS: Run time in seconds (default: 10)
 * - SIGMUX_SLOTS: Catalogue override, e.g. `HUP,INT,TERM`
 */

use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use sigmux::signals::limits::DEMO_RUN_TIME;
use sigmux::{
    block_catalogue_in_current_thread, init_tracing, Signal, SignalConfig, SignalControl,
    SignalSubsystem, SlotState, SlotTable,
};

const RUN_TIME_ENV_VAR: &str = "SIGTRAP_SECONDS";

fn run_time() -> Duration {
    match std::env::var(RUN_TIME_ENV_VAR) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(e) => {
                warn!("Ignoring {}={:?}: {}", RUN_TIME_ENV_VAR, raw, e);
                DEMO_RUN_TIME
            }
        },
        Err(_) => DEMO_RUN_TIME,
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let config = SignalConfig::from_env();

    // Must happen before any other thread exists.
    block_catalogue_in_current_thread(&SlotTable::from_config(&config)?)?;

    init_tracing();
    info!("sigtrap starting, pid {}", std::process::id());

    let subsystem = SignalSubsystem::new(config)?;
    let received = Arc::new(AtomicU64::new(0));

    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        let Some(slot) = subsystem.table().slot_for(signal) else {
            warn!("{} is not in the catalogue, skipping", signal);
            continue;
        };

        let received = received.clone();
        subsystem.add_listener(slot, move |slot, signal| {
            let n = received.fetch_add(1, Ordering::SeqCst) + 1;
            println!("caught {} on slot {} ({} so far)", signal, slot, n);
        })?;
        subsystem.set_state(slot, SlotState::Trapped)?;
        info!("Trapping {} on slot {}", signal, slot);
    }

    let run_time = run_time();
    info!("Running for {:?}", run_time);
    std::thread::sleep(run_time);

    subsystem.shutdown()?;

    let stats = subsystem.stats();
    info!(
        stats = %serde_json::to_string(&stats)?,
        received = received.load(Ordering::SeqCst),
        "sigtrap finished"
    );
    Ok(())
}
