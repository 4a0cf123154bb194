//! Time helpers shared across the codebase.
//!
//! All scheduling math runs on a monotonic clock anchored at process start:
//! the serializer model accumulates projected finish times, and a wall-clock
//! step (NTP, suspend/resume) would corrupt them.

use std::sync::OnceLock;
use std::time::Instant;

fn anchor() -> Instant {
    static ANCHOR: OnceLock<Instant> = OnceLock::new();
    *ANCHOR.get_or_init(Instant::now)
}

/// Microseconds since process start (monotonic).
pub fn now_us() -> i64 {
    anchor().elapsed().as_micros() as i64
}

/// Milliseconds since process start (monotonic).
pub fn now_ms() -> i64 {
    anchor().elapsed().as_millis() as i64
}
