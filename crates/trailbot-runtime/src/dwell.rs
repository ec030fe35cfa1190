//! [`DwellTracker`] – detects entry into a state.
//!
//! A *dwell* is a maximal run of consecutive records with the same value.
//! [`DwellTracker::record`] returns `true` only on the first record of a new
//! dwell, which is what one-shot side effects (the greeting) key on.
//!
//! # Example
//!
//! ```rust
//! use trailbot_runtime::dwell::DwellTracker;
//!
//! let mut dwell = DwellTracker::new();
//! assert!(dwell.record("engage"));   // entered
//! assert!(!dwell.record("engage"));  // still dwelling
//! assert!(dwell.record("search"));   // left and entered another
//! assert!(dwell.record("engage"));   // re-entry counts again
//! ```

#[derive(Debug, Clone, Default)]
pub struct DwellTracker<T> {
    current: Option<T>,
    ticks: u32,
}

impl<T: PartialEq + Copy> DwellTracker<T> {
    pub fn new() -> Self {
        Self {
            current: None,
            ticks: 0,
        }
    }

    /// Record this tick's value.  Returns `true` when a new dwell starts.
    pub fn record(&mut self, value: T) -> bool {
        if self.current == Some(value) {
            self.ticks = self.ticks.saturating_add(1);
            false
        } else {
            self.current = Some(value);
            self.ticks = 1;
            true
        }
    }

    pub fn current(&self) -> Option<T> {
        self.current
    }

    /// Length of the current dwell in records.
    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.ticks = 0;
    }
}
