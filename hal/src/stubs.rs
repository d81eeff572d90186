//! # Stub Host Implementations
//!
//! Software stand-ins for the host collaborators. Used during bring-up on
//! hosts that have not wired their own clock or detect line yet, and by tests
//! that need to drive time and slot state by hand.

use crate::card_detect::{CardDetect, CardDetectPolarity};
use crate::time::{Clock, Nanoseconds};
use crate::{HalError, HalResult};
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

// =============================================================================
// Manual Clock
// =============================================================================

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading zero
    pub const fn new() -> Self {
        Self {
            now: AtomicU64::new(0),
        }
    }

    /// Create a clock reading `start`
    pub const fn starting_at(start: Nanoseconds) -> Self {
        Self {
            now: AtomicU64::new(start.0),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Nanoseconds) {
        let _ = self
            .now
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| {
                Some(t.saturating_add(by.0))
            });
    }

    /// Jump to an absolute time; earlier values are ignored
    pub fn set(&self, at: Nanoseconds) {
        self.now.fetch_max(at.0, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Nanoseconds {
        Nanoseconds(self.now.load(Ordering::Acquire))
    }
}

// =============================================================================
// Stub Card Detect
// =============================================================================

const CD_ABSENT: u8 = 0;
const CD_PRESENT: u8 = 1;
const CD_UNAVAILABLE: u8 = 2;

/// Card-detect line driven from software
#[derive(Debug)]
pub struct StubCardDetect {
    state: AtomicU8,
    active_high: AtomicBool,
}

impl StubCardDetect {
    /// Slot with a working detect line and no card
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(CD_ABSENT),
            active_high: AtomicBool::new(false),
        }
    }

    /// Slot without a detect line
    pub const fn unavailable() -> Self {
        Self {
            state: AtomicU8::new(CD_UNAVAILABLE),
            active_high: AtomicBool::new(false),
        }
    }

    /// Force the line level
    pub fn set_present(&self, present: bool) {
        log::trace!("stub card-detect forced to {}", present);
        self.state
            .store(if present { CD_PRESENT } else { CD_ABSENT }, Ordering::Release);
    }

    /// Select the reported polarity
    pub fn set_active_high(&self, active_high: bool) {
        self.active_high.store(active_high, Ordering::Relaxed);
    }
}

impl Default for StubCardDetect {
    fn default() -> Self {
        Self::new()
    }
}

impl CardDetect for StubCardDetect {
    fn read_card_detect(&self) -> HalResult<bool> {
        match self.state.load(Ordering::Acquire) {
            CD_PRESENT => Ok(true),
            CD_ABSENT => Ok(false),
            _ => Err(HalError::NotSupported),
        }
    }

    fn polarity(&self) -> CardDetectPolarity {
        if self.active_high.load(Ordering::Relaxed) {
            CardDetectPolarity::ActiveHigh
        } else {
            CardDetectPolarity::ActiveLow
        }
    }
}
