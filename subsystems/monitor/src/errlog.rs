//! # Error Log Table
//!
//! One slot per (phase, kind) pair. Raw error codes are folded into two
//! canonical kinds before they reach the table: data corruption (`-EILSEQ`)
//! and timeout (everything else).

use sdwatch_hal::Nanoseconds;
use static_assertions::const_assert_eq;

use crate::request::{errno, Phase};
use crate::status::{CardState, CardStatus};

/// Canonical error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    /// CRC / illegal byte sequence
    DataCorruption = 0,
    /// Timeout and every other failure
    Timeout = 1,
}

impl ErrorKind {
    /// Number of kinds
    pub const COUNT: usize = 2;

    /// All kinds in table order
    pub const ALL: [ErrorKind; Self::COUNT] = [ErrorKind::DataCorruption, ErrorKind::Timeout];

    /// Fold a raw error code into a kind
    ///
    /// Returns `None` for success (`0`).
    pub const fn from_error(error: i32) -> Option<Self> {
        match error {
            0 => None,
            e if e == -errno::EILSEQ => Some(ErrorKind::DataCorruption),
            _ => Some(ErrorKind::Timeout),
        }
    }

    /// Negated errno representing the kind
    pub const fn errno(self) -> i32 {
        match self {
            ErrorKind::DataCorruption => -errno::EILSEQ,
            ErrorKind::Timeout => -errno::ETIMEDOUT,
        }
    }

    /// Position within a phase
    pub const fn ordinal(self) -> usize {
        self as usize
    }
}

/// Number of slots in the table
pub const LOG_SLOTS: usize = Phase::COUNT * ErrorKind::COUNT;

const_assert_eq!(LOG_SLOTS, 10);

/// One (phase, kind) slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorLogEntry {
    /// Request phase
    pub phase: Phase,
    /// Canonical kind
    pub kind: ErrorKind,
    /// Card status kept for diagnosis
    pub status: CardStatus,
    /// First error in the current epoch
    pub first_issue_time: Option<Nanoseconds>,
    /// Most recent error
    pub last_issue_time: Option<Nanoseconds>,
    /// Errors recorded in the current epoch
    pub count: u32,
}

impl ErrorLogEntry {
    const fn new(phase: Phase, kind: ErrorKind) -> Self {
        Self {
            phase,
            kind,
            status: CardStatus(0),
            first_issue_time: None,
            last_issue_time: None,
            count: 0,
        }
    }

    /// Label of the phase this slot belongs to
    pub const fn label(&self) -> &'static str {
        self.phase.label()
    }

    fn record(&mut self, status: CardStatus, now: Nanoseconds) {
        // Keep the first status of the epoch, unless the card is caught
        // outside the transfer state. Exact state match: DATA, RCV and PRG
        // replace the snapshot too.
        if self.status.is_empty() || status.current_state() != CardState::Tran {
            self.status = status;
        }
        if self.first_issue_time.is_none() {
            self.first_issue_time = Some(now);
        }
        self.last_issue_time = Some(now);
        self.count = self.count.saturating_add(1);
    }

    fn clear(&mut self) {
        self.status = CardStatus(0);
        self.first_issue_time = None;
        self.last_issue_time = None;
        self.count = 0;
    }
}

/// Fixed table of error slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLogTable {
    entries: [ErrorLogEntry; LOG_SLOTS],
}

impl ErrorLogTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            entries: core::array::from_fn(|i| {
                ErrorLogEntry::new(
                    Phase::ALL[i / ErrorKind::COUNT],
                    ErrorKind::ALL[i % ErrorKind::COUNT],
                )
            }),
        }
    }

    const fn index(phase: Phase, kind: ErrorKind) -> usize {
        phase.ordinal() * ErrorKind::COUNT + kind.ordinal()
    }

    /// Slot for (phase, kind)
    pub fn get(&self, phase: Phase, kind: ErrorKind) -> Option<&ErrorLogEntry> {
        self.entries.get(Self::index(phase, kind))
    }

    /// Count in the slot for (phase, kind)
    pub fn count(&self, phase: Phase, kind: ErrorKind) -> u32 {
        self.get(phase, kind).map_or(0, |e| e.count)
    }

    /// Sum of one kind over every phase
    pub fn total_of(&self, kind: ErrorKind) -> u64 {
        self.entries
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| u64::from(e.count))
            .sum()
    }

    /// Record a raw error code against a phase
    ///
    /// Success codes are ignored. Returns the kind the code was folded into
    /// when something was recorded.
    pub fn record(
        &mut self,
        phase: Phase,
        error: i32,
        status: CardStatus,
        now: Nanoseconds,
    ) -> Option<ErrorKind> {
        let kind = ErrorKind::from_error(error)?;
        let entry = self.entries.get_mut(Self::index(phase, kind))?;
        entry.record(status, now);
        Some(kind)
    }

    /// Reset every slot
    pub fn clear(&mut self) {
        self.entries.iter_mut().for_each(ErrorLogEntry::clear);
    }

    /// All slots in table order
    pub fn entries(&self) -> &[ErrorLogEntry] {
        &self.entries
    }

    /// No slot has recorded anything this epoch
    pub fn is_clear(&self) -> bool {
        self.entries
            .iter()
            .all(|e| e.count == 0 && e.first_issue_time.is_none() && e.status.is_empty())
    }
}

impl Default for ErrorLogTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRAN: u32 = 4 << 9;
    const PRG: u32 = 7 << 9;

    #[test]
    fn test_table_layout() {
        let table = ErrorLogTable::new();
        let entries = table.entries();

        assert_eq!(entries.len(), LOG_SLOTS);
        assert_eq!(entries[0].phase, Phase::Sbc);
        assert_eq!(entries[0].kind, ErrorKind::DataCorruption);
        assert_eq!(entries[1].kind, ErrorKind::Timeout);
        assert_eq!(entries[9].label(), "busy");
        assert!(table.is_clear());
    }

    #[test]
    fn test_error_folding() {
        assert_eq!(ErrorKind::from_error(0), None);
        assert_eq!(ErrorKind::from_error(-errno::EILSEQ), Some(ErrorKind::DataCorruption));
        assert_eq!(ErrorKind::from_error(-errno::ETIMEDOUT), Some(ErrorKind::Timeout));
        assert_eq!(ErrorKind::from_error(-errno::ENOMEDIUM), Some(ErrorKind::Timeout));
        assert_eq!(ErrorKind::from_error(-errno::EIO), Some(ErrorKind::Timeout));
        // Positive EILSEQ is not the distinguished code
        assert_eq!(ErrorKind::from_error(errno::EILSEQ), Some(ErrorKind::Timeout));
    }

    #[test]
    fn test_record_timestamps() {
        let mut table = ErrorLogTable::new();
        let t1 = Nanoseconds::from_millis(5);
        let t2 = Nanoseconds::from_millis(8);

        table.record(Phase::Data, -errno::EILSEQ, CardStatus(TRAN), t1);
        table.record(Phase::Data, -errno::EILSEQ, CardStatus(TRAN), t2);

        let entry = table.get(Phase::Data, ErrorKind::DataCorruption).unwrap();
        assert_eq!(entry.count, 2);
        assert_eq!(entry.first_issue_time, Some(t1));
        assert_eq!(entry.last_issue_time, Some(t2));
        assert_eq!(table.count(Phase::Data, ErrorKind::Timeout), 0);
    }

    #[test]
    fn test_zero_error_is_ignored() {
        let mut table = ErrorLogTable::new();
        assert_eq!(table.record(Phase::Cmd, 0, CardStatus(PRG), Nanoseconds::new(1)), None);
        assert!(table.is_clear());
    }

    #[test]
    fn test_status_snapshot_policy() {
        let mut table = ErrorLogTable::new();
        let now = Nanoseconds::new(1);

        // First error always stores its status
        table.record(Phase::Cmd, -errno::ETIMEDOUT, CardStatus(TRAN | 1), now);
        assert_eq!(table.get(Phase::Cmd, ErrorKind::Timeout).unwrap().status.raw(), TRAN | 1);

        // Later transfer-state status does not replace it
        table.record(Phase::Cmd, -errno::ETIMEDOUT, CardStatus(TRAN | 2), now);
        assert_eq!(table.get(Phase::Cmd, ErrorKind::Timeout).unwrap().status.raw(), TRAN | 1);

        // Any other state does
        table.record(Phase::Cmd, -errno::ETIMEDOUT, CardStatus(PRG), now);
        assert_eq!(table.get(Phase::Cmd, ErrorKind::Timeout).unwrap().status.raw(), PRG);
    }

    #[test]
    fn test_snapshot_replaced_by_states_sharing_tran_bits() {
        const DATA: u32 = 5 << 9;
        const RCV: u32 = 6 << 9;

        let mut table = ErrorLogTable::new();
        let now = Nanoseconds::new(1);
        table.record(Phase::Data, -errno::EILSEQ, CardStatus(TRAN | 1), now);

        for status in [DATA, RCV, PRG] {
            table.record(Phase::Data, -errno::EILSEQ, CardStatus(status), now);
            let entry = table.get(Phase::Data, ErrorKind::DataCorruption).unwrap();
            assert_eq!(entry.status.raw(), status);
        }
    }

    #[test]
    fn test_clear_and_totals() {
        let mut table = ErrorLogTable::new();
        let now = Nanoseconds::new(1);
        table.record(Phase::Cmd, -errno::ETIMEDOUT, CardStatus(PRG), now);
        table.record(Phase::Stop, -errno::EIO, CardStatus(PRG), now);
        table.record(Phase::Sbc, -errno::EILSEQ, CardStatus(PRG), now);

        assert_eq!(table.total_of(ErrorKind::Timeout), 2);
        assert_eq!(table.total_of(ErrorKind::DataCorruption), 1);

        table.clear();
        assert!(table.is_clear());
        assert_eq!(table.entries()[2].phase, Phase::Cmd);
    }
}
