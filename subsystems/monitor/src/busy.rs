//! # Busy-Stuck Detector
//!
//! The host polls CMD13 while a card is busy programming. If those polls are
//! all that has been sent for longer than the busy timeout and the card still
//! reports busy, the card is considered stuck.
//!
//! The host block layer gives up on busy cards after 10 seconds; the default
//! timeout here is 9 seconds so the stall is recorded before that happens.

use sdwatch_hal::Nanoseconds;

use crate::status::{CardState, CardStatus};

/// Default busy timeout
pub const DEFAULT_BUSY_TIMEOUT: Nanoseconds = Nanoseconds::from_millis(9 * 1000);

/// Watches status polls for a card stuck in programming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyStuckDetector {
    timeout: Nanoseconds,
    last_command: Nanoseconds,
}

impl BusyStuckDetector {
    /// Create a detector whose last command is `now`
    pub const fn new(timeout: Nanoseconds, now: Nanoseconds) -> Self {
        Self {
            timeout,
            last_command: now,
        }
    }

    /// Configured timeout
    pub const fn timeout(&self) -> Nanoseconds {
        self.timeout
    }

    /// Time of the last command other than a status poll
    pub const fn last_command(&self) -> Nanoseconds {
        self.last_command
    }

    /// Note a command other than a status poll
    pub fn note_command(&mut self, now: Nanoseconds) {
        self.last_command = now;
    }

    /// Check a status poll
    ///
    /// Returns `true` when the card is stuck. The last-command time is then
    /// moved to `now` so the following polls do not report the same stall.
    pub fn check(&mut self, status: CardStatus, now: Nanoseconds) -> bool {
        if now.since(self.last_command) < self.timeout {
            return false;
        }

        let busy = !status.is_empty()
            && (!status.ready_for_data() || status.current_state() == CardState::Prg);
        if busy {
            self.last_command = now;
        }
        busy
    }
}

impl Default for BusyStuckDetector {
    fn default() -> Self {
        Self::new(DEFAULT_BUSY_TIMEOUT, Nanoseconds::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRG: u32 = 7 << 9;
    const TRAN_READY: u32 = (4 << 9) | (1 << 8);
    const PRG_READY: u32 = PRG | (1 << 8);

    #[test]
    fn test_stuck_after_timeout() {
        let mut det = BusyStuckDetector::default();

        assert!(det.check(CardStatus(PRG), Nanoseconds::from_millis(9_100)));
        assert_eq!(det.last_command(), Nanoseconds::from_millis(9_100));

        // Rearmed at 9.1s
        assert!(!det.check(CardStatus(PRG), Nanoseconds::from_millis(9_200)));
        assert!(det.check(CardStatus(PRG), Nanoseconds::from_millis(18_100)));
    }

    #[test]
    fn test_not_stuck_before_timeout() {
        let mut det = BusyStuckDetector::default();
        assert!(!det.check(CardStatus(PRG), Nanoseconds::from_millis(8_999)));
        assert!(det.check(CardStatus(PRG), Nanoseconds::from_millis(9_000)));
    }

    #[test]
    fn test_commands_rearm() {
        let mut det = BusyStuckDetector::default();
        det.note_command(Nanoseconds::from_secs(5));
        assert!(!det.check(CardStatus(PRG), Nanoseconds::from_secs(10)));
        assert!(det.check(CardStatus(PRG), Nanoseconds::from_secs(14)));
    }

    #[test]
    fn test_busy_conditions() {
        let later = Nanoseconds::from_secs(60);

        // Ready and in transfer: fine
        let mut det = BusyStuckDetector::default();
        assert!(!det.check(CardStatus(TRAN_READY), later));
        assert_eq!(det.last_command(), Nanoseconds::ZERO);

        // Empty status word is ignored
        assert!(!det.check(CardStatus(0), later));

        // Programming state counts even when ready-for-data is set
        assert!(det.check(CardStatus(PRG_READY), later));

        // Not ready in transfer state counts too
        let mut det = BusyStuckDetector::default();
        assert!(det.check(CardStatus(4 << 9), later));
    }
}
