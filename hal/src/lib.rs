//! # sdwatch HAL - Host Abstraction Layer
//!
//! This crate defines the traits the error monitor uses to reach the host
//! controller driver it is attached to. The monitor never talks to hardware
//! directly; everything it needs from the host is expressed here.
//!
//! ## Collaborators
//!
//! - **Clock**: monotonic time source for issue timestamps and busy detection
//! - **Card detect**: the level of the card-detect line, when the slot has one
//!
//! Stub implementations for bring-up and testing live in [`stubs`].

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod time;
pub mod card_detect;

// Stub implementations (for bring-up and tests)
pub mod stubs;

use core::fmt;

pub use card_detect::CardDetect;
pub use time::{Clock, Nanoseconds};

/// Result type for HAL operations
pub type HalResult<T> = Result<T, HalError>;

/// Errors that can occur in HAL operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// The operation is not supported by this host
    NotSupported,
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HalError::NotSupported => write!(f, "Operation not supported by host"),
        }
    }
}
