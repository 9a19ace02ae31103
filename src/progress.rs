//! stderr diagnostics gated by a process-wide notification level.
//!
//! The toolkit is a library first; it never writes to stdout on its own and
//! only reports to stderr when the embedding program asked for it via
//! [`set_notification_level`]. Levels: 0 = silent, 1 = errors only,
//! 2 = results + warnings, 3 = progress, 4+ = verbose.

use std::io::Write;
use std::sync::atomic::{AtomicI32, Ordering};

/// Current notification level. Read with `Ordering::Relaxed`; exactness
/// across threads is not required for diagnostics.
pub static NOTIFY_LEVEL: AtomicI32 = AtomicI32::new(0);

/// Sets the global notification level and returns the value stored.
pub fn set_notification_level(level: i32) -> i32 {
    NOTIFY_LEVEL.store(level, Ordering::Relaxed);
    level
}

/// Returns the current notification level.
pub fn notification_level() -> i32 {
    NOTIFY_LEVEL.load(Ordering::Relaxed)
}

/// Writes `msg` (plus a newline) to stderr if the current level is ≥ `level`.
/// Flushes stderr at level ≥ 4 so verbose traces interleave correctly with
/// child process output.
pub fn note(level: i32, msg: &str) {
    if notification_level() >= level {
        eprintln!("{msg}");
        if notification_level() >= 4 {
            let _ = std::io::stderr().flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_notification_level_updates_global() {
        set_notification_level(3);
        assert_eq!(notification_level(), 3);
        set_notification_level(0);
        assert_eq!(notification_level(), 0);
    }
}
