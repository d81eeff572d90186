//! # Completed Requests
//!
//! What the host hands the monitor after a request finishes: up to three
//! commands (set-block-count, the main command, stop) plus an optional data
//! stage, each with its own error code and response word.

use bitflags::bitflags;

use crate::status::CardStatus;

/// Kernel error numbers the monitor distinguishes
///
/// Error codes reported by the host are negated, `0` means success.
pub mod errno {
    /// I/O error
    pub const EIO: i32 = 5;
    /// Illegal byte sequence (CRC / data corruption)
    pub const EILSEQ: i32 = 84;
    /// Timed out
    pub const ETIMEDOUT: i32 = 110;
    /// No medium found
    pub const ENOMEDIUM: i32 = 123;
}

/// Command opcodes with special handling
pub mod opcode {
    /// CMD13 SEND_STATUS
    pub const SEND_STATUS: u32 = 13;
    /// CMD19 SEND_TUNING_BLOCK
    pub const SEND_TUNING_BLOCK: u32 = 19;
    /// CMD21 SEND_TUNING_BLOCK_HS200
    pub const SEND_TUNING_BLOCK_HS200: u32 = 21;
    /// CMD23 SET_BLOCK_COUNT
    pub const SET_BLOCK_COUNT: u32 = 23;
    /// CMD12 STOP_TRANSMISSION
    pub const STOP_TRANSMISSION: u32 = 12;
    /// CMD55 APP_CMD
    pub const APP_CMD: u32 = 55;
}

bitflags! {
    /// Host command flags (response format and command type)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CommandFlags: u32 {
        /// A response is expected
        const RSP_PRESENT = 1 << 0;
        /// 136-bit response
        const RSP_136 = 1 << 1;
        /// Response carries a valid CRC
        const RSP_CRC = 1 << 2;
        /// Response contains the opcode
        const RSP_OPCODE = 1 << 4;
        /// Broadcast bit, set for both BC and BCR commands
        const CMD_BC = 1 << 6;

        /// R1 response on an addressed command
        const R1 = Self::RSP_PRESENT.bits() | Self::RSP_CRC.bits() | Self::RSP_OPCODE.bits();
        /// R2 (CID/CSD) response
        const R2 = Self::RSP_PRESENT.bits() | Self::RSP_136.bits() | Self::RSP_CRC.bits();
    }
}

impl Default for CommandFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Stage of a request an error is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Set-block-count command sent ahead of a multi-block transfer
    Sbc = 0,
    /// Main command
    Cmd = 1,
    /// Data stage
    Data = 2,
    /// Stop command
    Stop = 3,
    /// Busy detection on status polls
    Busy = 4,
}

impl Phase {
    /// Number of phases
    pub const COUNT: usize = 5;

    /// All phases in table order
    pub const ALL: [Phase; Self::COUNT] =
        [Phase::Sbc, Phase::Cmd, Phase::Data, Phase::Stop, Phase::Busy];

    /// Short label used in attribute output
    pub const fn label(self) -> &'static str {
        match self {
            Phase::Sbc => "sbc",
            Phase::Cmd => "cmd",
            Phase::Data => "data",
            Phase::Stop => "stop",
            Phase::Busy => "busy",
        }
    }

    /// Position in table order
    pub const fn ordinal(self) -> usize {
        self as usize
    }
}

/// Outcome of one command within a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandOutcome {
    /// Command index
    pub opcode: u32,
    /// Response/type flags
    pub flags: CommandFlags,
    /// First response word (R1 status for R1/R1b commands)
    pub response: u32,
    /// Negated errno, `0` on success
    pub error: i32,
}

impl CommandOutcome {
    /// Successful command with an R1 response
    pub const fn r1(opcode: u32, response: u32) -> Self {
        Self {
            opcode,
            flags: CommandFlags::R1,
            response,
            error: 0,
        }
    }

    /// Replace the flags
    pub const fn with_flags(mut self, flags: CommandFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Record a failure
    pub const fn with_error(mut self, error: i32) -> Self {
        self.error = error;
        self
    }
}

/// Outcome of the data stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataOutcome {
    /// Negated errno, `0` on success
    pub error: i32,
}

impl DataOutcome {
    /// Data stage that failed with `error`
    pub const fn failed(error: i32) -> Self {
        Self { error }
    }
}

/// A completed request as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestRecord {
    /// Set-block-count command, if one was sent
    pub sbc: Option<CommandOutcome>,
    /// Main command
    pub cmd: CommandOutcome,
    /// Data stage, if the request moved data
    pub data: Option<DataOutcome>,
    /// Stop command, if one was sent
    pub stop: Option<CommandOutcome>,
}

impl RequestRecord {
    /// Request consisting of a single command
    pub const fn command(cmd: CommandOutcome) -> Self {
        Self {
            sbc: None,
            cmd,
            data: None,
            stop: None,
        }
    }

    /// Status poll (CMD13) that returned `status`
    pub const fn status_poll(status: u32) -> Self {
        Self::command(CommandOutcome::r1(opcode::SEND_STATUS, status))
    }

    /// Attach a set-block-count command
    pub const fn with_sbc(mut self, sbc: CommandOutcome) -> Self {
        self.sbc = Some(sbc);
        self
    }

    /// Attach a data stage
    pub const fn with_data(mut self, data: DataOutcome) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach a stop command
    pub const fn with_stop(mut self, stop: CommandOutcome) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Status word seen across the whole request
    ///
    /// OR of the sbc, stop and main command responses.
    pub fn combined_status(&self) -> CardStatus {
        let sbc = self.sbc.map_or(0, |c| c.response);
        let stop = self.stop.map_or(0, |c| c.response);
        CardStatus(sbc | stop | self.cmd.response)
    }

    /// Main command is a status poll
    pub const fn is_status_poll(&self) -> bool {
        self.cmd.opcode == opcode::SEND_STATUS
    }

    /// Main command is a tuning block read
    pub const fn is_tuning(&self) -> bool {
        matches!(
            self.cmd.opcode,
            opcode::SEND_TUNING_BLOCK | opcode::SEND_TUNING_BLOCK_HS200
        )
    }

    /// Request is of a type whose errors are logged
    ///
    /// Only addressed commands with a short response count. APP_CMD is
    /// addressed but only prefixes the next command.
    pub fn is_loggable(&self) -> bool {
        let flags = self.cmd.flags;
        if !flags.contains(CommandFlags::RSP_PRESENT) {
            return false;
        }
        if flags.contains(CommandFlags::CMD_BC) {
            return false;
        }
        !flags.contains(CommandFlags::RSP_136) && self.cmd.opcode != opcode::APP_CMD
    }

    /// Error code per phase, in aggregation order
    ///
    /// Stages that were not part of the request report `0`.
    pub fn phase_errors(&self) -> [(Phase, i32); 4] {
        [
            (Phase::Cmd, self.cmd.error),
            (Phase::Sbc, self.sbc.map_or(0, |c| c.error)),
            (Phase::Data, self.data.map_or(0, |d| d.error)),
            (Phase::Stop, self.stop.map_or(0, |c| c.error)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const READ_MULTIPLE_BLOCK: u32 = 18;

    #[test]
    fn test_combined_status() {
        let req = RequestRecord::command(CommandOutcome::r1(READ_MULTIPLE_BLOCK, 0x900))
            .with_sbc(CommandOutcome::r1(opcode::SET_BLOCK_COUNT, 1 << 19))
            .with_stop(CommandOutcome::r1(opcode::STOP_TRANSMISSION, 1 << 31));

        assert_eq!(req.combined_status().raw(), 0x900 | (1 << 19) | (1 << 31));
    }

    #[test]
    fn test_loggable_types() {
        let r1 = RequestRecord::command(CommandOutcome::r1(READ_MULTIPLE_BLOCK, 0));
        assert!(r1.is_loggable());

        let no_rsp = RequestRecord::command(
            CommandOutcome::r1(0, 0).with_flags(CommandFlags::empty()),
        );
        assert!(!no_rsp.is_loggable());

        let bcr = RequestRecord::command(
            CommandOutcome::r1(3, 0).with_flags(CommandFlags::R1 | CommandFlags::CMD_BC),
        );
        assert!(!bcr.is_loggable());

        let r2 = RequestRecord::command(CommandOutcome::r1(9, 0).with_flags(CommandFlags::R2));
        assert!(!r2.is_loggable());

        let app = RequestRecord::command(CommandOutcome::r1(opcode::APP_CMD, 0));
        assert!(!app.is_loggable());
    }

    #[test]
    fn test_request_kinds() {
        assert!(RequestRecord::status_poll(0x900).is_status_poll());
        assert!(RequestRecord::command(CommandOutcome::r1(opcode::SEND_TUNING_BLOCK, 0)).is_tuning());
        assert!(RequestRecord::command(CommandOutcome::r1(opcode::SEND_TUNING_BLOCK_HS200, 0))
            .is_tuning());
        assert!(!RequestRecord::status_poll(0).is_tuning());
    }

    #[test]
    fn test_phase_errors_order() {
        let req = RequestRecord::command(CommandOutcome::r1(READ_MULTIPLE_BLOCK, 0))
            .with_data(DataOutcome::failed(-errno::EILSEQ));
        let errors = req.phase_errors();

        assert_eq!(errors[0], (Phase::Cmd, 0));
        assert_eq!(errors[1], (Phase::Sbc, 0));
        assert_eq!(errors[2], (Phase::Data, -errno::EILSEQ));
        assert_eq!(errors[3], (Phase::Stop, 0));
    }

    #[test]
    fn test_phase_table_order() {
        for (i, phase) in Phase::ALL.iter().enumerate() {
            assert_eq!(phase.ordinal(), i);
        }
        assert_eq!(Phase::Busy.label(), "busy");
    }
}
