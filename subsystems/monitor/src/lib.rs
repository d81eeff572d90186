//! # sdwatch Monitor - SD Card Error Monitor
//!
//! Observes every request an SD/MMC host completes for a removable card and
//! keeps error statistics for the card currently in the slot.
//!
//! ## Pipeline
//!
//! ```text
//! ┌────────────────────┐   ┌────────────────────┐   ┌────────────────────┐
//! │  STATUS CLASSIFIER │──►│   ERROR LOG TABLE  │──►│  BUSY-STUCK CHECK  │
//! │  GE CC ECC WP OOR  │   │  phase × {CRC,TMO} │   │   CMD13 only, 9s   │
//! └─────────┬──────────┘   └────────────────────┘   └────────────────────┘
//!           │ threshold
//!           ▼
//! ┌────────────────────┐   ┌────────────────────┐
//! │ NOTIFICATION QUEUE │──►│ NOTIFICATION WORKER│──► change event (IOERROR)
//! └────────────────────┘   └────────────────────┘
//! ```
//!
//! Card insertion and removal start a new epoch: every counter and timestamp
//! is cleared.
//!
//! The monitor never fails or alters a request. It observes, counts and, at
//! most, emits an informational event.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod status;
pub mod request;
pub mod errlog;
pub mod classifier;
pub mod busy;
pub mod notify;
pub mod card;
pub mod config;
pub mod report;
pub mod session;


use core::fmt;

pub use busy::BusyStuckDetector;
pub use card::SlotType;
pub use classifier::{StatusErrorCounters, Thresholds};
pub use config::MonitorConfig;
pub use errlog::{ErrorKind, ErrorLogEntry, ErrorLogTable};
pub use notify::{
    Delivery, IoErrorFlag, NotificationQueue, NotificationWorker, UeventEnv, UeventSink,
};
pub use request::{CommandFlags, CommandOutcome, DataOutcome, Phase, RequestRecord};
pub use session::DeviceSession;
pub use status::{CardState, CardStatus};

/// Result type for monitor operations
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Monitor errors
///
/// None of these ever reach the request that was being observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorError {
    /// A configuration parameter was malformed
    InvalidConfig(&'static str),
    /// Event environment ran out of variable slots or buffer space
    EnvFull,
    /// The event sink rejected the event (negated errno)
    EmitFailed(i32),
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorError::InvalidConfig(key) => write!(f, "Invalid configuration: {}", key),
            MonitorError::EnvFull => write!(f, "Event environment full"),
            MonitorError::EmitFailed(err) => write!(f, "Event emission failed with err {}", err),
        }
    }
}
