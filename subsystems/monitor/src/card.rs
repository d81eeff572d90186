//! # Card Events
//!
//! Tracks slot presence. Every insertion or removal starts a new counting
//! epoch: the error log and the status counters are wiped.

use sdwatch_hal::CardDetect;

use crate::classifier::StatusErrorCounters;
use crate::errlog::ErrorLogTable;

/// How the slot reports card presence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotType {
    /// No card-detect line
    NoDetect,
    /// Card-detect line, card can be swapped at runtime
    Hotplug,
    /// Card-detect line shared with a SIM tray
    Hybrid,
    /// Detect line present but slot type not described
    Invalid,
}

impl SlotType {
    /// Decode the platform value
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            0 => SlotType::NoDetect,
            1 => SlotType::Hotplug,
            2 => SlotType::Hybrid,
            _ => SlotType::Invalid,
        }
    }

    /// Platform value, `-1` for [`SlotType::Invalid`]
    pub const fn raw(self) -> i32 {
        match self {
            SlotType::NoDetect => 0,
            SlotType::Hotplug => 1,
            SlotType::Hybrid => 2,
            SlotType::Invalid => -1,
        }
    }

    /// Slot type when the platform does not describe one
    pub fn detect(card_detect: &dyn CardDetect) -> Self {
        match card_detect.read_card_detect() {
            Ok(_) => SlotType::Invalid,
            Err(_) => SlotType::NoDetect,
        }
    }
}

/// Presence as shown in attribute output
pub const fn tray_label(present: bool) -> &'static str {
    if present {
        "Insert"
    } else {
        "Remove"
    }
}

/// Presence state of the slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CardPresence {
    present: bool,
    detect_count: u32,
}

impl CardPresence {
    /// Start with the given presence
    pub const fn new(present: bool) -> Self {
        Self {
            present,
            detect_count: 0,
        }
    }

    /// Card currently in the slot
    pub const fn is_present(&self) -> bool {
        self.present
    }

    /// Transitions seen since attach, saturating
    pub const fn detect_count(&self) -> u32 {
        self.detect_count
    }

    /// Apply a presence reading
    ///
    /// On a change the detect count is bumped and the error log and status
    /// counters are cleared. Returns the previous presence when it changed.
    pub fn apply(
        &mut self,
        present: bool,
        table: &mut ErrorLogTable,
        counters: &mut StatusErrorCounters,
    ) -> Option<bool> {
        if present == self.present {
            return None;
        }

        let previous = self.present;
        self.present = present;
        self.detect_count = self.detect_count.saturating_add(1);
        table.clear();
        counters.clear();
        Some(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{errno, Phase};
    use crate::status::CardStatus;
    use sdwatch_hal::stubs::StubCardDetect;
    use sdwatch_hal::Nanoseconds;

    #[test]
    fn test_slot_type_raw() {
        assert_eq!(SlotType::from_raw(0), SlotType::NoDetect);
        assert_eq!(SlotType::from_raw(1), SlotType::Hotplug);
        assert_eq!(SlotType::from_raw(2), SlotType::Hybrid);
        assert_eq!(SlotType::from_raw(7), SlotType::Invalid);
        assert_eq!(SlotType::Invalid.raw(), -1);
    }

    #[test]
    fn test_slot_type_detect() {
        assert_eq!(SlotType::detect(&StubCardDetect::new()), SlotType::Invalid);
        assert_eq!(SlotType::detect(&StubCardDetect::unavailable()), SlotType::NoDetect);
    }

    #[test]
    fn test_apply_resets_on_change_only() {
        let mut presence = CardPresence::new(false);
        let mut table = ErrorLogTable::new();
        let mut counters = StatusErrorCounters::new();

        assert_eq!(presence.apply(true, &mut table, &mut counters), Some(false));
        assert_eq!(presence.detect_count(), 1);

        table.record(Phase::Cmd, -errno::ETIMEDOUT, CardStatus(1), Nanoseconds::new(1));
        counters.general_error = 4;

        // Same reading: nothing happens
        assert_eq!(presence.apply(true, &mut table, &mut counters), None);
        assert!(!table.is_clear());
        assert_eq!(counters.general_error, 4);
        assert_eq!(presence.detect_count(), 1);

        assert_eq!(presence.apply(false, &mut table, &mut counters), Some(true));
        assert!(table.is_clear());
        assert!(counters.is_clear());
        assert_eq!(presence.detect_count(), 2);
        assert!(!presence.is_present());
    }

    #[test]
    fn test_detect_count_saturates() {
        let mut presence = CardPresence {
            present: false,
            detect_count: u32::MAX - 1,
        };
        let mut table = ErrorLogTable::new();
        let mut counters = StatusErrorCounters::new();

        presence.apply(true, &mut table, &mut counters);
        presence.apply(false, &mut table, &mut counters);
        presence.apply(true, &mut table, &mut counters);
        assert_eq!(presence.detect_count(), u32::MAX);
    }

    #[test]
    fn test_tray_label() {
        assert_eq!(tray_label(true), "Insert");
        assert_eq!(tray_label(false), "Remove");
    }
}
