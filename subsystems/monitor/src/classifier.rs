//! # Status Classifier
//!
//! Counts the R1 error bits seen in completed requests and tells the caller
//! when one of the counters has just reached a notification threshold.

use crate::status::{CardStatus, StatusErrors};

/// Notification thresholds per counter
///
/// A counter notifies each time it reaches a non-zero multiple of its
/// threshold. CC errors are counted but never notify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// General error
    pub general_error: u32,
    /// Card ECC failure
    pub ecc_error: u32,
    /// Write-protect violation
    pub write_protect: u32,
    /// Out of range
    pub out_of_range: u32,
}

impl Thresholds {
    /// GE and ECC every 1000, WP and OOR every 100
    pub const DEFAULT: Self = Self {
        general_error: 1000,
        ecc_error: 1000,
        write_protect: 100,
        out_of_range: 100,
    };
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// `count` sits exactly on a non-zero multiple of `threshold`
#[inline]
pub const fn on_threshold(count: u32, threshold: u32) -> bool {
    count != 0 && threshold != 0 && count % threshold == 0
}

/// Status error counters for the current epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusErrorCounters {
    /// General error (`ERROR`)
    pub general_error: u32,
    /// Card controller error (`CC_ERROR`)
    pub cc_error: u32,
    /// Card ECC failure (`CARD_ECC_FAILED`)
    pub ecc_error: u32,
    /// Write-protect violation (`WP_VIOLATION`)
    pub write_protect: u32,
    /// Out of range (`OUT_OF_RANGE`)
    pub out_of_range: u32,
    /// Notifications actually sent
    pub notification: u32,
}

impl StatusErrorCounters {
    /// All counters at zero
    pub const fn new() -> Self {
        Self {
            general_error: 0,
            cc_error: 0,
            ecc_error: 0,
            write_protect: 0,
            out_of_range: 0,
            notification: 0,
        }
    }

    /// Count the error bits in `status`
    ///
    /// Returns `true` when at least one counter has just reached its
    /// threshold.
    pub fn classify(&mut self, status: CardStatus, thresholds: &Thresholds) -> bool {
        let errors = status.errors();
        let mut notify = false;

        if errors.contains(StatusErrors::ERROR) {
            self.general_error = self.general_error.saturating_add(1);
            notify |= on_threshold(self.general_error, thresholds.general_error);
        }
        if errors.contains(StatusErrors::CC_ERROR) {
            self.cc_error = self.cc_error.saturating_add(1);
        }
        if errors.contains(StatusErrors::CARD_ECC_FAILED) {
            self.ecc_error = self.ecc_error.saturating_add(1);
            notify |= on_threshold(self.ecc_error, thresholds.ecc_error);
        }
        if errors.contains(StatusErrors::WP_VIOLATION) {
            self.write_protect = self.write_protect.saturating_add(1);
            notify |= on_threshold(self.write_protect, thresholds.write_protect);
        }
        if errors.contains(StatusErrors::OUT_OF_RANGE) {
            self.out_of_range = self.out_of_range.saturating_add(1);
            notify |= on_threshold(self.out_of_range, thresholds.out_of_range);
        }

        notify
    }

    /// Some counter currently sits on its threshold
    ///
    /// Evaluated against the live counters, so a counter that has moved past
    /// the multiple since the notification was scheduled no longer reports.
    pub fn at_threshold(&self, thresholds: &Thresholds) -> bool {
        on_threshold(self.general_error, thresholds.general_error)
            || on_threshold(self.ecc_error, thresholds.ecc_error)
            || on_threshold(self.write_protect, thresholds.write_protect)
            || on_threshold(self.out_of_range, thresholds.out_of_range)
    }

    /// Reset every counter
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Every counter is zero
    pub fn is_clear(&self) -> bool {
        *self == Self::new()
    }
}
