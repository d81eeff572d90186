//! # Card Status Word
//!
//! R1 response decoding. Only the bits the monitor acts on are modeled.

use bitflags::bitflags;

bitflags! {
    /// R1 error bits tracked by the status classifier
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusErrors: u32 {
        /// General or unknown error
        const ERROR = 1 << 19;
        /// Internal card controller error
        const CC_ERROR = 1 << 20;
        /// Card internal ECC was applied but failed to correct the data
        const CARD_ECC_FAILED = 1 << 21;
        /// Write to a protected block
        const WP_VIOLATION = 1 << 26;
        /// Command argument out of range
        const OUT_OF_RANGE = 1 << 31;
    }
}

/// Mask of every status error bit the monitor counts
pub const STATUS_MASK: u32 = StatusErrors::all().bits();

/// Card status (R1 response)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CardStatus(pub u32);

impl CardStatus {
    /// Ready-for-data bit
    pub const READY_FOR_DATA: u32 = 1 << 8;

    /// Raw status word
    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// No bit set at all
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Ready for data
    pub const fn ready_for_data(&self) -> bool {
        (self.0 & Self::READY_FOR_DATA) != 0
    }

    /// Current state
    pub const fn current_state(&self) -> CardState {
        CardState::from_u8(((self.0 >> 9) & 0xF) as u8)
    }

    /// Tracked error bits that are set
    pub const fn errors(&self) -> StatusErrors {
        StatusErrors::from_bits_truncate(self.0)
    }

    /// Any tracked error bit set
    pub const fn has_tracked_error(&self) -> bool {
        (self.0 & STATUS_MASK) != 0
    }
}

impl From<u32> for CardStatus {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Card states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CardState {
    /// Idle state
    Idle = 0,
    /// Ready state
    Ready = 1,
    /// Identification state
    Ident = 2,
    /// Stand-by state
    Stby = 3,
    /// Transfer state
    Tran = 4,
    /// Data state
    Data = 5,
    /// Receive state
    Rcv = 6,
    /// Programming state
    Prg = 7,
    /// Disconnect state
    Dis = 8,
    /// Unknown or reserved state
    Unknown = 15,
}

impl CardState {
    /// Create from the 4-bit state field
    pub const fn from_u8(val: u8) -> Self {
        match val {
            0 => CardState::Idle,
            1 => CardState::Ready,
            2 => CardState::Ident,
            3 => CardState::Stby,
            4 => CardState::Tran,
            5 => CardState::Data,
            6 => CardState::Rcv,
            7 => CardState::Prg,
            8 => CardState::Dis,
            _ => CardState::Unknown,
        }
    }
}
