//! # Time Abstraction
//!
//! Monotonic timestamps as seen by the host driver.

use alloc::sync::Arc;
use core::fmt;
use core::ops::{Add, AddAssign, Sub};

/// Nanosecond timestamp or duration
///
/// Arithmetic saturates instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Nanoseconds(pub u64);

impl Nanoseconds {
    /// Zero
    pub const ZERO: Self = Self(0);
    /// Largest representable value
    pub const MAX: Self = Self(u64::MAX);

    /// Create from raw nanoseconds
    pub const fn new(ns: u64) -> Self {
        Self(ns)
    }

    /// Create from microseconds
    pub const fn from_micros(us: u64) -> Self {
        Self(us.saturating_mul(1_000))
    }

    /// Create from milliseconds
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms.saturating_mul(1_000_000))
    }

    /// Create from seconds
    pub const fn from_secs(s: u64) -> Self {
        Self(s.saturating_mul(1_000_000_000))
    }

    /// Whole microseconds
    pub const fn as_micros(&self) -> u64 {
        self.0 / 1_000
    }

    /// Whole milliseconds
    pub const fn as_millis(&self) -> u64 {
        self.0 / 1_000_000
    }

    /// Whole seconds
    pub const fn as_secs(&self) -> u64 {
        self.0 / 1_000_000_000
    }

    /// Raw nanoseconds
    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later
    pub const fn since(self, earlier: Self) -> Self {
        Self(self.0.saturating_sub(earlier.0))
    }
}

impl Add for Nanoseconds {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Nanoseconds {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl AddAssign for Nanoseconds {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl fmt::Display for Nanoseconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// Monotonic clock provided by the host
///
/// Equivalent of the per-CPU clock the host driver timestamps requests with.
/// Values must never go backwards.
pub trait Clock: Send + Sync {
    /// Current monotonic time
    fn now(&self) -> Nanoseconds;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Nanoseconds {
        (**self).now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Nanoseconds {
        (**self).now()
    }
}
