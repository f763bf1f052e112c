//! Fixed-window assignment.
//!
//! Windows are half-open intervals `[start, start + size)` over unix-ms
//! timestamps, disjoint and exhaustive: every timestamp belongs to exactly
//! one window, found by flooring to the window size.

mod store;

pub use store::{FiredWindow, InsertOutcome, WindowStore};

use std::time::Duration;

/// Key identifying one fixed window by its inclusive start (unix ms).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowKey {
    start_ms: i64,
}

impl WindowKey {
    /// Assign a timestamp to its window.
    pub fn for_timestamp(ts_ms: i64, size: Duration) -> Self {
        let size_ms = size.as_millis() as i64;
        debug_assert!(size_ms > 0, "window size must be positive");
        let start_ms = ts_ms.div_euclid(size_ms) * size_ms;
        Self { start_ms }
    }

    pub fn start_ms(&self) -> i64 {
        self.start_ms
    }

    /// Exclusive end of the window.
    pub fn end_ms(&self, size: Duration) -> i64 {
        self.start_ms + size.as_millis() as i64
    }

    /// Whether the window has closed at `now_ms` (zero allowed lateness).
    pub fn is_expired(&self, size: Duration, now_ms: i64) -> bool {
        now_ms >= self.end_ms(size)
    }
}

impl std::fmt::Display for WindowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}..)", self.start_ms)
    }
}
