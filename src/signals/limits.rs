/*!
 * Signal Subsystem Limits and Constants
 */

use std::time::Duration;

/// Number of logical slots in the standard catalogue
pub const DEFAULT_SLOT_COUNT: usize = 8;

/// Environment variable overriding the catalogue (comma-separated signal names)
pub const SLOTS_ENV_VAR: &str = "SIGMUX_SLOTS";

/// Name given to the delivery thread
pub const DELIVERY_THREAD_NAME: &str = "sigmux-delivery";

/// Name given to the listener dispatch thread
pub const DISPATCH_THREAD_NAME: &str = "sigmux-dispatch";

/// Default run time of the `sigtrap` demo
pub const DEMO_RUN_TIME: Duration = Duration::from_secs(10);
