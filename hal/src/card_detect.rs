//! # Card Detect Abstraction
//!
//! The card-detect line is owned by the host driver. The monitor only samples
//! it when a slot event is reported and at attach time.

use crate::HalResult;

/// Polarity of the card-detect line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardDetectPolarity {
    /// Line is high while a card is inserted
    ActiveHigh,
    /// Line is low while a card is inserted
    ActiveLow,
}

impl CardDetectPolarity {
    /// Name used in log lines
    pub const fn name(self) -> &'static str {
        match self {
            CardDetectPolarity::ActiveHigh => "HIGH",
            CardDetectPolarity::ActiveLow => "LOW",
        }
    }
}

/// Card-detect line provided by the host
pub trait CardDetect: Send + Sync {
    /// Read the card-detect line
    ///
    /// Returns `true` while a card is inserted, with polarity already applied.
    /// Slots without a detect line return [`HalError::NotSupported`].
    ///
    /// [`HalError::NotSupported`]: crate::HalError::NotSupported
    fn read_card_detect(&self) -> HalResult<bool>;

    /// Configured polarity of the line
    fn polarity(&self) -> CardDetectPolarity {
        CardDetectPolarity::ActiveLow
    }
}
